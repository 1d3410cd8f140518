//! Embedded document store
//!
//! An in-process [`DocumentStore`] backed by an Automerge document, with
//! optional persistence to disk. It has no network transport: `start_sync`
//! and `stop_sync` only record whether replication would be running, which
//! is enough to drive the sync control loop and to run the CLI offline.
//!
//! Observer callbacks run on a single dedicated delivery thread, never while
//! the store lock is held, so callbacks for any one observer are delivered
//! in order and never overlap.

pub mod document;
pub mod dql;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::facade::{ChangeHandler, DocumentStore, ObserverHandle, SubscriptionHandle};
use crate::query::{Params, Query, QueryItem, QueryResult};
use crate::storage::StorePersistence;

use document::CollectionsDocument;
use dql::{Select, Statement};

/// In-process document store
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct EmbeddedStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    sync_active: AtomicBool,
    next_handle: AtomicU64,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

struct State {
    doc: CollectionsDocument,
    persistence: Option<StorePersistence>,
    subscriptions: HashMap<SubscriptionHandle, Select>,
    observers: HashMap<ObserverHandle, Arc<Observer>>,
    /// Bumped by every mutating statement
    revision: u64,
}

struct Observer {
    select: Select,
    params: Params,
    on_change: ChangeHandler,
    /// Revision current at registration; older changes are already in the
    /// initial result
    since: u64,
}

enum Delivery {
    /// First result for a newly registered observer
    Initial(ObserverHandle),
    /// Data reached this revision; observers registered before it get their
    /// current result
    Changed(u64),
}

impl EmbeddedStore {
    /// Create a store that lives only in memory
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_document(CollectionsDocument::new()?, None)
    }

    /// Open (or create) a store persisted at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let persistence = StorePersistence::new(path);
        let doc = persistence.load_or_create()?;
        info!(path = %persistence.path().display(), "Opened embedded store");
        Self::with_document(doc, Some(persistence))
    }

    /// Open the store at the configured location
    pub fn open_with_config(config: &Config) -> Result<Self, StoreError> {
        Self::open(config.store_path())
    }

    fn with_document(
        doc: CollectionsDocument,
        persistence: Option<StorePersistence>,
    ) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                doc,
                persistence,
                subscriptions: HashMap::new(),
                observers: HashMap::new(),
                revision: 0,
            }),
            sync_active: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            deliveries: tx,
        });

        let weak = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("tasksync-delivery".to_string())
            .spawn(move || delivery_loop(weak, rx))
            .map_err(StoreError::Delivery)?;

        Ok(Self { shared })
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.shared.lock_state().subscriptions.len()
    }

    /// Number of live observers
    pub fn observer_count(&self) -> usize {
        self.shared.lock_state().observers.len()
    }

    /// Names of collections that hold documents
    pub fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.shared.lock_state().doc.collection_names()?)
    }

    fn next_id(&self) -> u64 {
        self.shared.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panicking caller: every mutation
        // either completes or returns an error before touching it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, delivery: Delivery) {
        let observers: Vec<(ObserverHandle, Arc<Observer>)> = {
            let state = self.lock_state();
            match delivery {
                Delivery::Initial(handle) => state
                    .observers
                    .get(&handle)
                    .map(|o| vec![(handle, Arc::clone(o))])
                    .unwrap_or_default(),
                Delivery::Changed(revision) => state
                    .observers
                    .iter()
                    .filter(|(_, o)| o.since < revision)
                    .map(|(h, o)| (*h, Arc::clone(o)))
                    .collect(),
            }
        };

        for (handle, observer) in observers {
            let result = {
                let state = self.lock_state();
                // Closed while earlier observers were being notified
                if !state.observers.contains_key(&handle) {
                    continue;
                }
                state.run_select(&observer.select, &observer.params)
            };

            match result {
                Ok(result) => (observer.on_change)(result),
                Err(e) => warn!(observer = %handle, error = %e, "Observer query failed"),
            }
        }
    }
}

fn delivery_loop(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(delivery) = rx.blocking_recv() {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.deliver(delivery);
    }
    debug!("Observer delivery stopped");
}

impl State {
    fn run_select(&self, select: &Select, params: &Params) -> Result<QueryResult, StoreError> {
        let documents = self.doc.documents(&select.collection)?;
        let rows = select.apply(documents, params)?;
        Ok(QueryResult::from_items(
            rows.into_iter().map(QueryItem::from).collect(),
        ))
    }

    /// Run a statement; the flag reports whether any document changed
    fn apply(
        &mut self,
        statement: &Statement,
        params: &Params,
    ) -> Result<(QueryResult, bool), StoreError> {
        match statement {
            Statement::Select(select) => Ok((self.run_select(select, params)?, false)),
            Statement::Insert(insert) => {
                let mut documents = insert.documents(params)?;
                for document in &mut documents {
                    if !document.contains_key("_id") {
                        document.insert("_id".to_string(), Value::String(Uuid::new_v4().to_string()));
                    }
                }

                for document in &documents {
                    let Some(Value::String(id)) = document.get("_id") else {
                        return Err(StoreError::InvalidDocument(
                            "_id must be a string".to_string(),
                        ));
                    };
                    if self.doc.contains(&insert.collection, id)? {
                        return Err(StoreError::DocumentExists {
                            collection: insert.collection.clone(),
                            id: id.clone(),
                        });
                    }
                }

                // All or nothing: a failure anywhere drops the staged copy
                let mut staged = self.doc.fork();
                let mut ids = Vec::with_capacity(documents.len());
                for document in &documents {
                    ids.push(staged.insert(&insert.collection, document)?);
                }
                self.commit(staged)?;
                Ok((QueryResult::from_mutation(ids), true))
            }
            Statement::Update(update) => {
                let mut staged = self.doc.fork();
                let mut ids = Vec::new();
                for document in self.doc.documents(&update.collection)? {
                    if !update.matches(&document, params)? {
                        continue;
                    }
                    let Some(Value::String(id)) = document.get("_id") else {
                        continue;
                    };
                    let fields = update.assignments_for(&document, params)?;
                    staged.update(&update.collection, id, &fields)?;
                    ids.push(id.clone());
                }

                let mutated = !ids.is_empty();
                if mutated {
                    self.commit(staged)?;
                }
                Ok((QueryResult::from_mutation(ids), mutated))
            }
        }
    }

    /// Save a staged document and make it current
    ///
    /// On a failed save the current document stays as it was.
    fn commit(&mut self, mut staged: CollectionsDocument) -> Result<(), StoreError> {
        if let Some(persistence) = self.persistence.as_ref() {
            persistence.save(&mut staged)?;
        }
        self.doc = staged;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for EmbeddedStore {
    async fn execute(&self, query: &Query) -> Result<QueryResult, StoreError> {
        let statement = dql::parse(query.statement())?;
        let mut state = self.shared.lock_state();
        let (result, mutated) = state.apply(&statement, query.params())?;

        if mutated {
            state.revision += 1;
            debug!(
                documents = result.mutated_document_ids().len(),
                revision = state.revision,
                "Documents changed"
            );
            // Queued under the lock so deliveries follow revision order.
            // Only fails once the delivery thread is gone, i.e. on teardown
            let _ = self.shared.deliveries.send(Delivery::Changed(state.revision));
        }
        Ok(result)
    }

    fn register_subscription(&self, query: &Query) -> Result<SubscriptionHandle, StoreError> {
        let select = dql::parse_select(query.statement())?;
        let handle = SubscriptionHandle::new(self.next_id());
        debug!(subscription = %handle, collection = %select.collection, "Registered subscription");
        self.shared.lock_state().subscriptions.insert(handle, select);
        Ok(handle)
    }

    fn register_observer(
        &self,
        query: &Query,
        on_change: ChangeHandler,
    ) -> Result<ObserverHandle, StoreError> {
        let select = dql::parse_select(query.statement())?;
        let handle = ObserverHandle::new(self.next_id());
        debug!(observer = %handle, collection = %select.collection, "Registered observer");

        let mut state = self.shared.lock_state();
        let observer = Arc::new(Observer {
            select,
            params: query.params().clone(),
            on_change,
            since: state.revision,
        });
        state.observers.insert(handle, observer);
        let _ = self.shared.deliveries.send(Delivery::Initial(handle));
        Ok(handle)
    }

    fn close_subscription(&self, handle: SubscriptionHandle) -> Result<(), StoreError> {
        if self.shared.lock_state().subscriptions.remove(&handle).is_some() {
            debug!(subscription = %handle, "Closed subscription");
        }
        Ok(())
    }

    fn close_observer(&self, handle: ObserverHandle) -> Result<(), StoreError> {
        if self.shared.lock_state().observers.remove(&handle).is_some() {
            debug!(observer = %handle, "Closed observer");
        }
        Ok(())
    }

    fn start_sync(&self) -> Result<(), StoreError> {
        if !self.shared.sync_active.swap(true, Ordering::SeqCst) {
            info!(
                subscriptions = self.subscription_count(),
                "Sync started"
            );
        }
        Ok(())
    }

    fn stop_sync(&self) -> Result<(), StoreError> {
        if self.shared.sync_active.swap(false, Ordering::SeqCst) {
            info!("Sync stopped");
        }
        Ok(())
    }

    fn is_sync_active(&self) -> bool {
        self.shared.sync_active.load(Ordering::SeqCst)
    }
}
