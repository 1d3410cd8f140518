//! Error types
//!
//! - [`StoreError`]: anything the document store reports (syntax, I/O, conflicts)
//! - [`ValidationError`]: rejected input, raised before any statement runs
//! - [`ReleaseError`]: a subscription/observer pair that did not release cleanly
//!
//! [`Error`] wraps all of them for the higher-level APIs.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors reported by a document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The statement could not be parsed or is not supported
    #[error("Invalid query: {0}")]
    Query(String),

    /// A `:name` placeholder had no matching parameter
    #[error("Missing query parameter ':{0}'")]
    MissingParameter(String),

    /// An insert collided with an existing document id
    #[error("Document '{id}' already exists in collection '{collection}'")]
    DocumentExists { collection: String, id: String },

    /// A document value had the wrong shape
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Automerge error
    #[error("Automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    /// On-disk persistence failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Replication could not be started or stopped
    #[error("Sync error: {0}")]
    Sync(String),

    /// The observer delivery thread could not be started
    #[error("Failed to start observer delivery: {0}")]
    Delivery(#[source] std::io::Error),
}

impl StoreError {
    /// Whether this error is an insert colliding with an existing document
    pub fn is_document_exists(&self) -> bool {
        matches!(self, StoreError::DocumentExists { .. })
    }

    /// What the user can do about a storage failure, if anything
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::Storage(e) => e.recovery_suggestion(),
            _ => None,
        }
    }
}

/// Input rejected before reaching the store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Task titles must contain something other than whitespace
    #[error("Task title cannot be empty")]
    EmptyTitle,

    /// Collection names are interpolated into statements, so they must be identifiers
    #[error("Invalid collection name '{0}': use letters, digits and underscores")]
    InvalidCollection(String),

    /// No task matches the given id or prefix
    #[error("Task not found: {0}")]
    UnknownTask(String),

    /// More than one task matches the given id prefix
    #[error("Ambiguous task id '{prefix}' matches {count} tasks")]
    AmbiguousTask { prefix: String, count: usize },
}

/// Failure releasing one or both halves of a subscription/observer pair
///
/// Both releases are always attempted; each failure is kept.
#[derive(Error, Debug, Default)]
#[error("{}", release_message(.subscription, .observer))]
pub struct ReleaseError {
    /// Failure closing the network subscription
    pub subscription: Option<StoreError>,
    /// Failure closing the local observer
    pub observer: Option<StoreError>,
}

impl ReleaseError {
    /// Build from the two release outcomes; `Ok` when both succeeded
    pub fn from_results(
        subscription: std::result::Result<(), StoreError>,
        observer: std::result::Result<(), StoreError>,
    ) -> std::result::Result<(), ReleaseError> {
        let error = ReleaseError {
            subscription: subscription.err(),
            observer: observer.err(),
        };

        if error.subscription.is_none() && error.observer.is_none() {
            Ok(())
        } else {
            Err(error)
        }
    }
}

fn release_message(subscription: &Option<StoreError>, observer: &Option<StoreError>) -> String {
    let mut msg = "Failed to release live query resources".to_string();
    if let Some(e) = subscription {
        msg.push_str(&format!("; subscription: {}", e));
    }
    if let Some(e) = observer {
        msg.push_str(&format!("; observer: {}", e));
    }
    msg
}

/// Crate-level error
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

impl Error {
    /// What the user can do about a storage failure, if anything
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Store(e) => e.recovery_suggestion(),
            _ => None,
        }
    }
}

/// Result type for tasksync operations
pub type Result<T> = std::result::Result<T, Error>;
