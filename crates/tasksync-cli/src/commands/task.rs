//! Task command handlers

use anyhow::{Context, Result};

use tasksync_core::TaskApp;

use crate::output::{short_id, Output};

/// Add a new task
pub async fn add(app: &TaskApp, title: String, output: &Output) -> Result<()> {
    let task = app
        .add_task(&title)
        .await
        .context("Failed to add task")?;

    output.success(&format!("Added task: {}", short_id(&task.id)));
    if !output.is_json() {
        output.print_task(&task);
    }
    Ok(())
}

/// List undeleted tasks
pub async fn list(app: &TaskApp, output: &Output) -> Result<()> {
    let tasks = app.tasks().list().await?;
    output.print_tasks(&tasks);
    Ok(())
}

/// List undeleted tasks whose title starts with `prefix`
pub async fn find(app: &TaskApp, prefix: String, output: &Output) -> Result<()> {
    let tasks = app.tasks().find_by_title_prefix(&prefix).await?;
    output.print_tasks(&tasks);
    Ok(())
}

/// Rename a task
pub async fn rename(app: &TaskApp, id: String, title: String, output: &Output) -> Result<()> {
    let id = app.tasks().resolve_id(&id).await?;
    app.rename_task(&id, &title)
        .await
        .context("Failed to rename task")?;

    output.success(&format!("Renamed task: {}", short_id(&id)));
    Ok(())
}

/// Flip a task's done flag
pub async fn toggle(app: &TaskApp, id: String, output: &Output) -> Result<()> {
    let id = app.tasks().resolve_id(&id).await?;
    match app.toggle_task_done(&id).await? {
        Some(true) => output.success(&format!("Completed task: {}", short_id(&id))),
        Some(false) => output.success(&format!("Reopened task: {}", short_id(&id))),
        None => output.message(&format!("Task {} is gone", short_id(&id))),
    }
    Ok(())
}

/// Soft-delete a task
pub async fn delete(app: &TaskApp, id: String, output: &Output) -> Result<()> {
    let id = app.tasks().resolve_id(&id).await?;
    app.delete_task(&id)
        .await
        .context("Failed to delete task")?;

    output.success(&format!("Deleted task: {}", short_id(&id)));
    Ok(())
}
