//! On-disk persistence for the embedded store

pub mod error;
pub mod persistence;

pub use error::{StorageError, StorageResult};
pub use persistence::StorePersistence;
