//! Subscription-observer pairs
//!
//! A live query needs two registrations: a sync subscription so replication
//! pulls the matching documents from peers, and a local observer so changes
//! reach the caller. [`SubscriptionObserverPair`] owns both and releases them
//! together.

use tracing::{debug, warn};

use crate::error::{ReleaseError, StoreError};
use crate::facade::{ChangeHandler, ObserverHandle, SharedStore, SubscriptionHandle};
use crate::query::Query;

/// A sync subscription and local observer with one lifetime
///
/// Released by [`close`](Self::close) or, failing that, on drop.
pub struct SubscriptionObserverPair {
    store: SharedStore,
    subscription: Option<SubscriptionHandle>,
    observer: Option<ObserverHandle>,
}

impl SubscriptionObserverPair {
    /// Register a subscription, then an observer
    ///
    /// If the observer can't be registered the subscription is closed again,
    /// so a failed open leaves nothing behind.
    pub fn open(
        store: SharedStore,
        subscription_query: &Query,
        observer_query: &Query,
        on_change: ChangeHandler,
    ) -> Result<Self, StoreError> {
        let subscription = store.register_subscription(subscription_query)?;

        let observer = match store.register_observer(observer_query, on_change) {
            Ok(observer) => observer,
            Err(e) => {
                if let Err(close_err) = store.close_subscription(subscription) {
                    warn!(
                        subscription = %subscription,
                        error = %close_err,
                        "Failed to roll back subscription after observer registration failed"
                    );
                }
                return Err(e);
            }
        };

        debug!(subscription = %subscription, observer = %observer, "Opened live query pair");
        Ok(Self {
            store,
            subscription: Some(subscription),
            observer: Some(observer),
        })
    }

    /// Open a pair whose subscription and observer use the same query
    pub fn open_same(
        store: SharedStore,
        query: &Query,
        on_change: ChangeHandler,
    ) -> Result<Self, StoreError> {
        Self::open(store, query, query, on_change)
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription
    }

    pub fn observer(&self) -> Option<ObserverHandle> {
        self.observer
    }

    /// Release both registrations
    ///
    /// The observer release is attempted even if the subscription release
    /// fails; every failure is reported.
    pub fn close(mut self) -> Result<(), ReleaseError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), ReleaseError> {
        let subscription = match self.subscription.take() {
            Some(handle) => self.store.close_subscription(handle),
            None => Ok(()),
        };
        let observer = match self.observer.take() {
            Some(handle) => self.store.close_observer(handle),
            None => Ok(()),
        };
        ReleaseError::from_results(subscription, observer)
    }
}

impl Drop for SubscriptionObserverPair {
    fn drop(&mut self) {
        if self.subscription.is_none() && self.observer.is_none() {
            return;
        }
        if let Err(e) = self.release() {
            warn!(error = %e, "Live query pair released with errors");
        }
    }
}
