//! tasksync core library
//!
//! Live queries and sync control for a local-first task list kept in a
//! synchronized document store.
//!
//! # Architecture
//!
//! - **Subscription-observer pairs**: a sync subscription and a local observer
//!   registered and released as one resource
//! - **Live queries**: observer callbacks bridged into a latest-wins stream of
//!   complete snapshots
//! - **Sync control**: the sync-enabled flag is a stored document; a background
//!   loop observes it and starts or stops replication to match
//! - **Task gateway**: task intents as parameterized statements, with soft
//!   deletion
//!
//! The store is reached only through [`DocumentStore`]. [`EmbeddedStore`] is
//! an Automerge-backed implementation that runs in-process.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = Arc::new(EmbeddedStore::open_with_config(&config)?);
//! let app = TaskApp::start(store, &config).await?;
//!
//! let mut tasks = app.observe_tasks()?;
//! app.add_task("Buy milk").await?;
//! let snapshot = tasks.next().await;
//!
//! app.toggle_sync().await?;
//! ```
//!
//! # Modules
//!
//! - `app`: application facade for delivery adapters
//! - `control`: sync control loop
//! - `tasks`: task mutations and queries
//! - `live`: live query streams
//! - `pair`: subscription-observer pairs
//! - `facade`: the document store trait
//! - `embedded`: in-process Automerge store
//! - `storage`: store persistence
//! - `config`: application configuration

pub mod app;
pub mod config;
pub mod control;
pub mod embedded;
pub mod error;
pub mod facade;
pub mod live;
pub mod models;
pub mod pair;
pub mod query;
pub mod storage;
pub mod tasks;

pub use app::TaskApp;
pub use config::Config;
pub use control::{SyncControl, SYNC_STATE_ID};
pub use embedded::EmbeddedStore;
pub use error::{Error, ReleaseError, Result, StoreError, ValidationError};
pub use facade::{ChangeHandler, DocumentStore, ObserverHandle, SharedStore, SubscriptionHandle};
pub use live::LiveQuery;
pub use models::{SyncStateDocument, Task};
pub use pair::SubscriptionObserverPair;
pub use query::{Params, Query, QueryItem, QueryResult};
pub use storage::{StorageError, StorePersistence};
pub use tasks::{TaskGateway, TASKS_COLLECTION};
