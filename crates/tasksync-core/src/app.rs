//! Task application
//!
//! [`TaskApp`] is what delivery adapters (the CLI, an SSE endpoint, a UI)
//! talk to: two live streams and the imperative intents.

use std::sync::Arc;

use tokio_stream::wrappers::WatchStream;

use crate::config::Config;
use crate::control::SyncControl;
use crate::error::Result;
use crate::facade::SharedStore;
use crate::live::LiveQuery;
use crate::models::Task;
use crate::tasks::TaskGateway;

/// A task list with sync control, wired to one store
pub struct TaskApp {
    store: SharedStore,
    tasks: TaskGateway,
    sync: SyncControl,
}

impl TaskApp {
    /// Start the app, creating the sync control document if needed
    pub async fn start(store: SharedStore, config: &Config) -> Result<Self> {
        let sync = SyncControl::start(Arc::clone(&store), config.sync_state_collection()).await?;
        Ok(Self {
            tasks: TaskGateway::new(Arc::clone(&store)),
            sync,
            store,
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn tasks(&self) -> &TaskGateway {
        &self.tasks
    }

    pub fn sync(&self) -> &SyncControl {
        &self.sync
    }

    /// Snapshots of undeleted tasks
    pub fn observe_tasks(&self) -> Result<LiveQuery<Task>> {
        Ok(self.tasks.observe()?)
    }

    /// Observed sync-enabled values, starting with the current one
    pub fn observe_sync_state(&self) -> WatchStream<bool> {
        self.sync.subscribe()
    }

    pub async fn add_task(&self, title: &str) -> Result<Task> {
        self.tasks.add(title).await
    }

    pub async fn rename_task(&self, id: &str, title: &str) -> Result<()> {
        self.tasks.rename(id, title).await
    }

    pub async fn toggle_task_done(&self, id: &str) -> Result<Option<bool>> {
        self.tasks.toggle_done(id).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.tasks.soft_delete(id).await
    }

    /// Request the opposite of the current sync state; returns the value written
    pub async fn toggle_sync(&self) -> Result<bool> {
        Ok(self.sync.toggle_sync().await?)
    }

    /// Stop the control loop
    pub async fn shutdown(self) -> Result<()> {
        self.sync.shutdown().await
    }
}
