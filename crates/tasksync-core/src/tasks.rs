//! Task mutations and queries
//!
//! Translates task intents into statements against the `tasks` collection.
//! Tasks are never removed: deleting sets `deleted = true`, and every
//! listing filters deleted tasks out.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, StoreError, ValidationError};
use crate::facade::SharedStore;
use crate::live::LiveQuery;
use crate::models::Task;
use crate::query::{Query, QueryResult};

/// Collection holding tasks
pub const TASKS_COLLECTION: &str = "tasks";

const SUBSCRIBE_ALL: &str = "SELECT * FROM tasks";
const SELECT_UNDELETED: &str = "SELECT * FROM tasks WHERE NOT deleted ORDER BY _id";
const SELECT_BY_ID: &str = "SELECT * FROM tasks WHERE _id = :id";
const SELECT_BY_TITLE_PREFIX: &str =
    "SELECT * FROM tasks WHERE title LIKE :pattern AND NOT deleted ORDER BY _id";
const INSERT_TASK: &str = "INSERT INTO tasks DOCUMENTS (:task)";
const UPDATE_TITLE: &str = "UPDATE tasks SET title = :title WHERE _id = :id";
const UPDATE_DONE: &str = "UPDATE tasks SET done = :done WHERE _id = :id";
const UPDATE_DELETED: &str = "UPDATE tasks SET deleted = true WHERE _id = :id";

/// Task operations over a document store
#[derive(Clone)]
pub struct TaskGateway {
    store: SharedStore,
}

impl TaskGateway {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Create a task; the title is trimmed and must not be empty
    pub async fn add(&self, title: &str) -> Result<Task> {
        let task = Task::new(validate_title(title)?);
        let query = Query::new(INSERT_TASK).param("task", task.to_document());
        self.store.execute(&query).await?;
        info!(id = %task.id, "Added task");
        Ok(task)
    }

    /// Change a task's title
    pub async fn rename(&self, id: &str, title: &str) -> Result<()> {
        let title = validate_title(title)?;
        let query = Query::new(UPDATE_TITLE)
            .param("title", title)
            .param("id", id);
        let result = self.store.execute(&query).await?;
        debug!(id, updated = result.mutated_document_ids().len(), "Renamed task");
        Ok(())
    }

    /// Flip a task's done flag
    ///
    /// Returns the new value, or `None` if the task no longer exists.
    pub async fn toggle_done(&self, id: &str) -> Result<Option<bool>> {
        let Some(task) = self.get(id).await? else {
            debug!(id, "Toggle on missing task ignored");
            return Ok(None);
        };

        let done = !task.done;
        let query = Query::new(UPDATE_DONE).param("done", done).param("id", id);
        self.store.execute(&query).await?;
        debug!(id, done, "Toggled task");
        Ok(Some(done))
    }

    /// Mark a task deleted; repeating this is harmless
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        let query = Query::new(UPDATE_DELETED).param("id", id);
        self.store.execute(&query).await?;
        info!(id, "Deleted task");
        Ok(())
    }

    /// Fetch a task by id, including deleted ones
    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        let result = self
            .store
            .execute(&Query::new(SELECT_BY_ID).param("id", id))
            .await?;
        Ok(decode_tasks(result)?.into_iter().next())
    }

    /// All undeleted tasks, ordered by id
    pub async fn list(&self) -> Result<Vec<Task>> {
        let result = self.store.execute(&Query::new(SELECT_UNDELETED)).await?;
        Ok(decode_tasks(result)?)
    }

    /// Undeleted tasks whose title starts with `prefix`
    ///
    /// `%` and `_` in the prefix act as wildcards.
    pub async fn find_by_title_prefix(&self, prefix: &str) -> Result<Vec<Task>> {
        let query =
            Query::new(SELECT_BY_TITLE_PREFIX).param("pattern", format!("{}%", prefix));
        let result = self.store.execute(&query).await?;
        Ok(decode_tasks(result)?)
    }

    /// Resolve a full id or unique id prefix among undeleted tasks
    pub async fn resolve_id(&self, id_or_prefix: &str) -> Result<String> {
        let matches: Vec<Task> = self
            .list()
            .await?
            .into_iter()
            .filter(|task| task.id.starts_with(id_or_prefix))
            .collect();

        if let Some(exact) = matches.iter().find(|task| task.id == id_or_prefix) {
            return Ok(exact.id.clone());
        }
        match matches.len() {
            0 => Err(ValidationError::UnknownTask(id_or_prefix.to_string()).into()),
            1 => Ok(matches[0].id.clone()),
            count => Err(ValidationError::AmbiguousTask {
                prefix: id_or_prefix.to_string(),
                count,
            }
            .into()),
        }
    }

    /// Live snapshots of undeleted tasks
    ///
    /// Subscribes to the whole collection so deleted tasks still replicate.
    pub fn observe(&self) -> std::result::Result<LiveQuery<Task>, StoreError> {
        LiveQuery::deserialized(
            Arc::clone(&self.store),
            &Query::new(SUBSCRIBE_ALL),
            &Query::new(SELECT_UNDELETED),
        )
    }
}

fn validate_title(title: &str) -> std::result::Result<&str, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        Err(ValidationError::EmptyTitle)
    } else {
        Ok(title)
    }
}

fn decode_tasks(result: QueryResult) -> std::result::Result<Vec<Task>, StoreError> {
    result
        .into_items()
        .into_iter()
        .map(|item| {
            serde_json::from_value::<Task>(item.into_value())
                .map_err(|e| StoreError::InvalidDocument(format!("task: {}", e)))
        })
        .collect()
}
