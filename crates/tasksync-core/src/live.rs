//! Live queries as streams
//!
//! [`LiveQuery`] turns a subscription-observer pair into a [`Stream`] of
//! decoded snapshots. Each snapshot is the complete current result of the
//! observer's query, never a delta.
//!
//! Delivery is latest-wins: the observer overwrites a single slot and the
//! stream yields whatever is in it when polled, so a slow consumer skips
//! intermediate snapshots but always ends up at the newest one.

use std::fmt::Display;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::error::{ReleaseError, StoreError};
use crate::facade::{ChangeHandler, SharedStore};
use crate::pair::SubscriptionObserverPair;
use crate::query::{Query, QueryItem, QueryResult};

/// A stream of snapshots backed by its own subscription-observer pair
///
/// Dropping or [`cancel`](Self::cancel)ling the stream releases the pair.
/// Callbacks that race with cancellation are discarded.
pub struct LiveQuery<T> {
    pair: Option<SubscriptionObserverPair>,
    live: Arc<AtomicBool>,
    latest: watch::Receiver<Option<Vec<T>>>,
    snapshots: Pin<Box<WatchStream<Option<Vec<T>>>>>,
}

impl<T> LiveQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Open a live query, decoding each document with `decode`
    ///
    /// Documents that fail to decode are logged and left out of the snapshot.
    pub fn open<F, E>(
        store: SharedStore,
        subscription_query: &Query,
        observer_query: &Query,
        decode: F,
    ) -> Result<Self, StoreError>
    where
        F: Fn(&QueryItem) -> Result<T, E> + Send + Sync + 'static,
        E: Display,
    {
        let (tx, rx) = watch::channel(None);
        let live = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&live);
        let on_change: ChangeHandler = Box::new(move |result: QueryResult| {
            if !flag.load(Ordering::Acquire) {
                return;
            }
            let snapshot = decode_snapshot(result, &decode);
            tx.send_replace(Some(snapshot));
        });

        let pair =
            SubscriptionObserverPair::open(store, subscription_query, observer_query, on_change)?;

        Ok(Self {
            pair: Some(pair),
            live,
            latest: rx.clone(),
            snapshots: Box::pin(WatchStream::new(rx)),
        })
    }

    /// Whether the query still delivers snapshots
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// The most recent snapshot, if one has arrived
    pub fn current(&self) -> Option<Vec<T>> {
        self.latest.borrow().clone()
    }

    /// Stop delivery and release the pair
    pub fn cancel(mut self) -> Result<(), ReleaseError> {
        self.live.store(false, Ordering::Release);
        match self.pair.take() {
            Some(pair) => {
                debug!("Cancelling live query");
                pair.close()
            }
            None => Ok(()),
        }
    }
}

impl<T> LiveQuery<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open a live query whose documents deserialize into `T`
    pub fn deserialized(
        store: SharedStore,
        subscription_query: &Query,
        observer_query: &Query,
    ) -> Result<Self, StoreError> {
        Self::open(store, subscription_query, observer_query, |item: &QueryItem| {
            item.deserialize_value::<T>()
        })
    }
}

fn decode_snapshot<T, F, E>(result: QueryResult, decode: &F) -> Vec<T>
where
    F: Fn(&QueryItem) -> Result<T, E>,
    E: Display,
{
    result
        .items()
        .iter()
        .filter_map(|item| match decode(item) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    document = item.id().unwrap_or("<no id>"),
                    error = %e,
                    "Skipping document that failed to decode"
                );
                None
            }
        })
        .collect()
}

impl<T> Stream for LiveQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = Vec<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.snapshots.as_mut().poll_next(cx) {
                Poll::Ready(Some(Some(snapshot))) => return Poll::Ready(Some(snapshot)),
                // Nothing delivered yet
                Poll::Ready(Some(None)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
        if let Some(pair) = self.pair.take() {
            if let Err(e) = pair.close() {
                warn!(error = %e, "Live query released with errors");
            }
        }
    }
}
