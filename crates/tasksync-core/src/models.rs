//! Data models for tasksync
//!
//! Defines the stored document shapes: Task and the sync control document.
//! Field names match the documents in the store, so `_id` is renamed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A to-do item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Unique identifier
    #[serde(rename = "_id")]
    pub id: String,
    /// What needs doing
    pub title: String,
    /// Completion flag
    #[serde(default)]
    pub done: bool,
    /// Soft-delete flag; deleted tasks stay stored but are never listed
    #[serde(default)]
    pub deleted: bool,
}

impl Task {
    /// Create a new task with a fresh id
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title)
    }

    /// Create a task with a specific id (for loading from storage)
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            done: false,
            deleted: false,
        }
    }

    /// The task as a store document
    pub fn to_document(&self) -> Value {
        serde_json::json!({
            "_id": self.id,
            "title": self.title,
            "done": self.done,
            "deleted": self.deleted,
        })
    }
}

/// The stored sync control document
///
/// Exactly one exists per control collection, with the well-known id
/// [`crate::control::SYNC_STATE_ID`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStateDocument {
    #[serde(rename = "_id")]
    pub id: String,
    /// Whether replication should be running
    pub sync_state: bool,
}

impl SyncStateDocument {
    pub fn new(id: impl Into<String>, sync_state: bool) -> Self {
        Self {
            id: id.into(),
            sync_state,
        }
    }
}
