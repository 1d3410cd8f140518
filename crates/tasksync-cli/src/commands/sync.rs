//! Sync command handlers
//!
//! Every change goes through the control document; replication follows once
//! the control loop observes the write.

use anyhow::{Context, Result};
use futures_util::StreamExt;

use tasksync_core::{Config, TaskApp};

use crate::output::{Output, OutputFormat};
use crate::sse::SseEvent;

/// Show the stored sync state and replication settings
pub fn status(app: &TaskApp, config: &Config, output: &Output) -> Result<()> {
    let enabled = app.sync().is_enabled();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "sync_state": enabled,
                    "collection": app.sync().collection(),
                    "websocket_url": config.websocket_url,
                    "device_name": config.device_name,
                })
            );
        }
        OutputFormat::Quiet => println!("{}", enabled),
        OutputFormat::Human => {
            println!("Sync:");
            println!("  enabled:       {}", enabled);
            println!("  collection:    {}", app.sync().collection());
            println!(
                "  websocket_url: {}",
                config.websocket_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  device_name:   {}",
                config.device_name.as_deref().unwrap_or("(not set)")
            );
            if enabled && config.websocket_url.is_none() {
                println!();
                println!("No replication endpoint configured. Set one with:");
                println!("  tasksync config set websocket_url ws://your-server:4000");
            }
        }
    }

    Ok(())
}

/// Flip the stored sync state
pub async fn toggle(app: &TaskApp, output: &Output) -> Result<()> {
    let enabled = app
        .toggle_sync()
        .await
        .context("Failed to toggle sync")?;
    settle(app, enabled).await?;
    report(enabled, output);
    Ok(())
}

/// Store an explicit sync state
pub async fn set(app: &TaskApp, enabled: bool, output: &Output) -> Result<()> {
    app.sync()
        .set_sync_enabled(enabled)
        .await
        .context("Failed to update sync state")?;
    settle(app, enabled).await?;
    report(enabled, output);
    Ok(())
}

/// Print every observed sync state until interrupted
pub async fn watch(app: &TaskApp, sse: bool, output: &Output) -> Result<()> {
    let mut states = app.observe_sync_state();

    loop {
        tokio::select! {
            state = states.next() => {
                let Some(enabled) = state else { break };
                if sse {
                    print!("{}", SseEvent::sync_state(enabled));
                } else {
                    output.print_sync_state(enabled);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Wait for the control loop to observe our write
///
/// Replication has been started or stopped to match once this returns.
async fn settle(app: &TaskApp, enabled: bool) -> Result<()> {
    app.sync()
        .watch()
        .wait_for(|observed| *observed == enabled)
        .await
        .context("Sync control stopped before observing the change")?;
    Ok(())
}

fn report(enabled: bool, output: &Output) {
    if enabled {
        output.success("Sync enabled");
    } else {
        output.success("Sync disabled");
    }
}
