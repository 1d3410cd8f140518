//! The document store boundary
//!
//! Everything above this module talks to the store only through
//! [`DocumentStore`]: run statements, register sync subscriptions and local
//! observers, and switch replication on or off.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::query::{Query, QueryResult};

/// Callback invoked with the complete current result of an observer's query
pub type ChangeHandler = Box<dyn Fn(QueryResult) + Send + Sync + 'static>;

/// A store shared between components
pub type SharedStore = Arc<dyn DocumentStore>;

/// Registration of a sync subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Registration of a local observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl ObserverHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// A local-first document store with replication
///
/// A subscription tells replication which documents to pull from peers; an
/// observer is a local callback that receives the full result of its query
/// whenever matching data changes, starting with the current result.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Execute a select, insert or update statement
    async fn execute(&self, query: &Query) -> Result<QueryResult, StoreError>;

    /// Register interest in syncing the documents a query matches
    fn register_subscription(&self, query: &Query) -> Result<SubscriptionHandle, StoreError>;

    /// Register a callback for the query's result set
    ///
    /// Callbacks for one observer are never invoked concurrently.
    fn register_observer(
        &self,
        query: &Query,
        on_change: ChangeHandler,
    ) -> Result<ObserverHandle, StoreError>;

    /// Cancel a subscription; closing twice is not an error
    fn close_subscription(&self, handle: SubscriptionHandle) -> Result<(), StoreError>;

    /// Cancel an observer; closing twice is not an error
    fn close_observer(&self, handle: ObserverHandle) -> Result<(), StoreError>;

    /// Start replication; no-op if already running
    fn start_sync(&self) -> Result<(), StoreError>;

    /// Stop replication; no-op if already stopped
    fn stop_sync(&self) -> Result<(), StoreError>;

    /// Whether replication is currently running
    fn is_sync_active(&self) -> bool;
}
