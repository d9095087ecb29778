//! Subscriber Hub
//!
//! Fans session updates out to any number of UI surfaces. Every subscriber
//! owns an unbounded delivery queue, so deliveries are per-subscriber
//! ordered and gap-free, and a slow consumer never holds up the publisher or
//! its peers. The first delivery of every subscription is the current
//! snapshot.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};

use code_historian_core::AnalysisState;

/// One published state, tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    /// `None` until the server has assigned an id
    pub session_id: Option<String>,
    pub state: AnalysisState,
}

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
struct HubInner {
    current: SessionUpdate,
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<SessionUpdate>>,
    closed: bool,
}

/// Publish/subscribe registry for [`SessionUpdate`]s.
pub struct SubscriberHub {
    inner: Mutex<HubInner>,
    runtime: Handle,
}

impl SubscriberHub {
    /// Create an empty hub. Callback subscribers run on the blocking pool of
    /// the runtime this is called from.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            runtime: Handle::current(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // the inner state stays consistent across a poisoned lock: every
        // mutation is a single insert/remove/assign
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe with a receiver. The receiver yields the current snapshot
    /// first, then every later update, and ends when the hub is closed.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        // snapshot is queued under the lock so no publish can slip in front
        let _ = tx.send(inner.current.clone());
        if !inner.closed {
            inner.subscribers.insert(id, tx);
        }
        debug!("Subscriber {} registered", id);
        (Subscription(id), rx)
    }

    /// Subscribe with a callback, invoked once per update on a dedicated
    /// blocking thread so a slow callback never occupies an async worker. A
    /// panicking callback is logged and keeps receiving.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&SessionUpdate) + Send + 'static,
    {
        let (subscription, mut rx) = self.subscribe_channel();
        let mut callback = callback;
        // ends once the sender is removed by unsubscribe, close or drop
        self.runtime.spawn_blocking(move || {
            while let Some(update) = rx.blocking_recv() {
                if catch_unwind(AssertUnwindSafe(|| callback(&update))).is_err() {
                    error!(
                        "Subscriber {} panicked while handling {} update",
                        subscription.0,
                        update.state.name()
                    );
                }
            }
        });
        subscription
    }

    /// Remove a subscription. Returns `false` when it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let removed = self.lock().subscribers.remove(&subscription.0).is_some();
        if removed {
            debug!("Subscriber {} removed", subscription.0);
        }
        removed
    }

    pub fn current(&self) -> SessionUpdate {
        self.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Record `update` as current and queue it for every subscriber.
    pub(crate) fn publish(&self, update: SessionUpdate) {
        let mut inner = self.lock();
        inner
            .subscribers
            .retain(|_, tx| tx.send(update.clone()).is_ok());
        inner.current = update;
    }

    /// Drop every subscriber. Later subscriptions receive the final
    /// snapshot and nothing else.
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }
}
