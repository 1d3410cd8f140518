//! Sync control loop
//!
//! Whether replication runs is itself a stored document:
//! `{_id: "sync_state", sync_state: bool}` in the `<app>_sync_state`
//! collection. Toggling sync writes that document and nothing else. A
//! background task observes it, starts or stops replication to match, and
//! republishes every observed value to listeners.
//!
//! Because only the loop touches replication, the running state always
//! follows the stored intent, including writes made by other peers.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use crate::error::{ReleaseError, Result, StoreError, ValidationError};
use crate::facade::{DocumentStore, SharedStore};
use crate::live::LiveQuery;
use crate::models::SyncStateDocument;
use crate::query::Query;

/// Id of the single control document
pub const SYNC_STATE_ID: &str = "sync_state";

/// Whether a name can be used as a collection in a statement
pub fn is_valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Handle to a running sync control loop
pub struct SyncControl {
    store: SharedStore,
    collection: String,
    state: watch::Receiver<bool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<std::result::Result<(), ReleaseError>>,
}

impl SyncControl {
    /// Ensure the control document exists and start observing it
    ///
    /// A missing document is created with sync disabled. If another instance
    /// creates it first, the stored value is used instead.
    pub async fn start(store: SharedStore, collection: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        if !is_valid_collection_name(&collection) {
            return Err(ValidationError::InvalidCollection(collection).into());
        }

        let initial = ensure_control_document(&store, &collection).await?;

        let query = control_query(&collection);
        let live = LiveQuery::<SyncStateDocument>::deserialized(Arc::clone(&store), &query, &query)?;

        let (state_tx, state_rx) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(observe_loop(
            Arc::clone(&store),
            live,
            state_tx,
            shutdown_rx,
        ));

        info!(collection = %collection, enabled = initial, "Sync control started");
        Ok(Self {
            store,
            collection,
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        })
    }

    /// Collection holding the control document
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Last observed value
    pub fn is_enabled(&self) -> bool {
        *self.state.borrow()
    }

    /// Receiver for observed values
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.clone()
    }

    /// Stream of observed values, starting with the current one
    pub fn subscribe(&self) -> WatchStream<bool> {
        WatchStream::new(self.state.clone())
    }

    /// Write the negation of the last observed value
    ///
    /// Returns the value written. Replication changes once the loop observes
    /// the write.
    pub async fn toggle_sync(&self) -> std::result::Result<bool, StoreError> {
        let enabled = !self.is_enabled();
        self.set_sync_enabled(enabled).await?;
        Ok(enabled)
    }

    /// Write an explicit value to the control document
    pub async fn set_sync_enabled(&self, enabled: bool) -> std::result::Result<(), StoreError> {
        let query = Query::new(format!(
            "UPDATE {} SET sync_state = :enabled WHERE _id = :id",
            self.collection
        ))
        .param("enabled", enabled)
        .param("id", SYNC_STATE_ID);

        let result = self.store.execute(&query).await?;
        if result.mutated_document_ids().is_empty() {
            warn!(collection = %self.collection, "Sync control document missing; write had no effect");
        } else {
            debug!(enabled, "Wrote sync state");
        }
        Ok(())
    }

    /// Stop the loop and release its live query
    ///
    /// Replication is left as it is.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await??;
        debug!(collection = %self.collection, "Sync control stopped");
        Ok(())
    }
}

fn control_query(collection: &str) -> Query {
    Query::new(format!("SELECT * FROM {} WHERE _id = :id", collection)).param("id", SYNC_STATE_ID)
}

async fn read_sync_state(
    store: &SharedStore,
    collection: &str,
) -> std::result::Result<Option<bool>, StoreError> {
    let result = store.execute(&control_query(collection)).await?;
    match result.first() {
        Some(item) => {
            let document: SyncStateDocument = item.deserialize_value().map_err(|e| {
                StoreError::InvalidDocument(format!("sync control document: {}", e))
            })?;
            Ok(Some(document.sync_state))
        }
        None => Ok(None),
    }
}

async fn ensure_control_document(
    store: &SharedStore,
    collection: &str,
) -> std::result::Result<bool, StoreError> {
    if let Some(enabled) = read_sync_state(store, collection).await? {
        return Ok(enabled);
    }

    let insert = Query::new(format!("INSERT INTO {} DOCUMENTS (:state)", collection))
        .param("state", json!({"_id": SYNC_STATE_ID, "sync_state": false}));

    match store.execute(&insert).await {
        Ok(_) => {
            info!(collection, "Created sync control document");
            Ok(false)
        }
        Err(e) if e.is_document_exists() => {
            debug!(collection, "Sync control document was created concurrently");
            Ok(read_sync_state(store, collection).await?.unwrap_or(false))
        }
        Err(e) => Err(e),
    }
}

async fn observe_loop(
    store: SharedStore,
    mut live: LiveQuery<SyncStateDocument>,
    state: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> std::result::Result<(), ReleaseError> {
    loop {
        tokio::select! {
            snapshot = live.next() => {
                let Some(snapshot) = snapshot else {
                    debug!("Sync control observer closed");
                    break;
                };
                let Some(document) = snapshot.into_iter().next() else {
                    warn!("Sync control document not found");
                    continue;
                };
                apply_sync_state(store.as_ref(), document.sync_state);
                state.send_replace(document.sync_state);
            }
            _ = shutdown.changed() => break,
        }
    }

    live.cancel()
}

fn apply_sync_state(store: &dyn DocumentStore, enabled: bool) {
    let active = store.is_sync_active();
    if enabled && !active {
        match store.start_sync() {
            Ok(()) => info!("Sync enabled"),
            Err(e) => error!(error = %e, "Failed to start sync"),
        }
    } else if !enabled && active {
        match store.stop_sync() {
            Ok(()) => info!("Sync disabled"),
            Err(e) => error!(error = %e, "Failed to stop sync"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::timeout;

    use crate::embedded::EmbeddedStore;
    use crate::error::Error;
    use crate::facade::{ChangeHandler, ObserverHandle, SubscriptionHandle};
    use crate::query::QueryResult;

    const COLLECTION: &str = "tasks_sync_state";

    /// Embedded store that counts replication start/stop calls
    pub(crate) struct CountingStore {
        pub inner: EmbeddedStore,
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
        /// Report the control document as missing on the first read
        pub hide_first_read: std::sync::atomic::AtomicBool,
    }

    impl CountingStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: EmbeddedStore::in_memory().unwrap(),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                hide_first_read: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn execute(&self, query: &Query) -> std::result::Result<QueryResult, StoreError> {
            if query.statement().starts_with("SELECT")
                && self.hide_first_read.swap(false, Ordering::SeqCst)
            {
                return Ok(QueryResult::default());
            }
            self.inner.execute(query).await
        }

        fn register_subscription(
            &self,
            query: &Query,
        ) -> std::result::Result<SubscriptionHandle, StoreError> {
            self.inner.register_subscription(query)
        }

        fn register_observer(
            &self,
            query: &Query,
            on_change: ChangeHandler,
        ) -> std::result::Result<ObserverHandle, StoreError> {
            self.inner.register_observer(query, on_change)
        }

        fn close_subscription(&self, handle: SubscriptionHandle) -> std::result::Result<(), StoreError> {
            self.inner.close_subscription(handle)
        }

        fn close_observer(&self, handle: ObserverHandle) -> std::result::Result<(), StoreError> {
            self.inner.close_observer(handle)
        }

        fn start_sync(&self) -> std::result::Result<(), StoreError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.inner.start_sync()
        }

        fn stop_sync(&self) -> std::result::Result<(), StoreError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.inner.stop_sync()
        }

        fn is_sync_active(&self) -> bool {
            self.inner.is_sync_active()
        }
    }

    async fn wait_for_state(control: &SyncControl, expected: bool) {
        let mut rx = control.watch();
        timeout(Duration::from_secs(5), rx.wait_for(|v| *v == expected))
            .await
            .expect("timed out waiting for sync state")
            .expect("sync control stopped");
    }

    async fn stored_documents(store: &CountingStore) -> QueryResult {
        store
            .inner
            .execute(&Query::new(format!("SELECT * FROM {}", COLLECTION)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_creates_disabled_document() {
        let store = CountingStore::new();
        let control = SyncControl::start(store.clone(), COLLECTION).await.unwrap();

        assert!(!control.is_enabled());
        let docs = stored_documents(&store).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs.items()[0].id(), Some(SYNC_STATE_ID));
        assert_eq!(docs.items()[0].get("sync_state"), Some(&json!(false)));

        control.shutdown().await.unwrap();
        assert!(!store.is_sync_active());
        assert_eq!(store.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_toggle_converges_and_starts_once() {
        let store = CountingStore::new();
        let control = SyncControl::start(store.clone(), COLLECTION).await.unwrap();

        assert!(control.toggle_sync().await.unwrap());
        wait_for_state(&control, true).await;
        assert!(store.is_sync_active());
        assert_eq!(store.starts.load(Ordering::SeqCst), 1);

        assert!(!control.toggle_sync().await.unwrap());
        wait_for_state(&control, false).await;
        assert!(!store.is_sync_active());
        assert_eq!(store.stops.load(Ordering::SeqCst), 1);

        control.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_values_do_not_restart_sync() {
        let store = CountingStore::new();
        let control = SyncControl::start(store.clone(), COLLECTION).await.unwrap();

        control.set_sync_enabled(true).await.unwrap();
        wait_for_state(&control, true).await;
        control.set_sync_enabled(true).await.unwrap();
        control.set_sync_enabled(true).await.unwrap();

        // Firings are ordered, so once false is observed every earlier
        // firing has been handled
        control.set_sync_enabled(false).await.unwrap();
        wait_for_state(&control, false).await;

        assert_eq!(store.starts.load(Ordering::SeqCst), 1);
        assert_eq!(store.stops.load(Ordering::SeqCst), 1);
        control.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_enabled_document_starts_sync() {
        let store = CountingStore::new();
        store
            .inner
            .execute(
                &Query::new(format!("INSERT INTO {} DOCUMENTS (:state)", COLLECTION))
                    .param("state", json!({"_id": SYNC_STATE_ID, "sync_state": true})),
            )
            .await
            .unwrap();

        let control = SyncControl::start(store.clone(), COLLECTION).await.unwrap();
        assert!(control.is_enabled());

        let mut rx = control.watch();
        timeout(Duration::from_secs(5), async {
            while !store.is_sync_active() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(store.starts.load(Ordering::SeqCst), 1);

        control.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_creation_uses_stored_value() {
        let store = CountingStore::new();
        store
            .inner
            .execute(
                &Query::new(format!("INSERT INTO {} DOCUMENTS (:state)", COLLECTION))
                    .param("state", json!({"_id": SYNC_STATE_ID, "sync_state": true})),
            )
            .await
            .unwrap();
        // First read misses, so start() races into a duplicate insert
        store.hide_first_read.store(true, Ordering::SeqCst);

        let control = SyncControl::start(store.clone(), COLLECTION).await.unwrap();
        assert!(control.is_enabled());
        assert_eq!(stored_documents(&store).await.len(), 1);

        control.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_collection_rejected() {
        let store = CountingStore::new();
        let err = SyncControl::start(store, "bad name; --")
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidCollection(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_releases_live_query() {
        let store = CountingStore::new();
        let control = SyncControl::start(store.clone(), COLLECTION).await.unwrap();
        assert_eq!(store.inner.observer_count(), 1);
        assert_eq!(store.inner.subscription_count(), 1);

        control.shutdown().await.unwrap();
        assert_eq!(store.inner.observer_count(), 0);
        assert_eq!(store.inner.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_yields_current_value_first() {
        let store = CountingStore::new();
        let control = SyncControl::start(store.clone(), COLLECTION).await.unwrap();

        let mut stream = control.subscribe();
        assert_eq!(stream.next().await, Some(false));

        control.toggle_sync().await.unwrap();
        let mut seen = Vec::new();
        timeout(Duration::from_secs(5), async {
            while let Some(value) = stream.next().await {
                seen.push(value);
                if value {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(seen.last(), Some(&true));

        control.shutdown().await.unwrap();
    }

    #[test]
    fn test_collection_names() {
        assert!(is_valid_collection_name("tasks_sync_state"));
        assert!(is_valid_collection_name("_private"));
        assert!(!is_valid_collection_name(""));
        assert!(!is_valid_collection_name("9lives"));
        assert!(!is_valid_collection_name("my tasks"));
        assert!(!is_valid_collection_name("tasks;drop"));
    }
}
