// crates/stmt-diag-core/src/runtime/broadcast.rs
// ============================================================================
// Module: Statement Diagnostics Broadcast Transports
// Description: In-process broadcast bus and a no-op transport.
// Purpose: Drive cross-node notification delivery in tests and single-node runs.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryBroadcastBus`] stands in for the cluster broadcast substrate:
//! publishes are queued and delivered to every matching subscriber when
//! [`InMemoryBroadcastBus::deliver_pending`] runs, so tests decide exactly when
//! remote nodes observe a notification. Callbacks run without any bus lock held.
//! [`NoopBroadcaster`] drops every publish; the periodic poller is then the only
//! path by which other processes learn about new requests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use crate::core::ClusterNotification;
use crate::core::WireNotification;
use crate::interfaces::BroadcastError;
use crate::interfaces::Broadcaster;
use crate::interfaces::NotificationCallback;

// ============================================================================
// SECTION: In-Memory Bus
// ============================================================================

/// Registered subscriber.
struct Subscription {
    /// Key prefix the subscriber listens on.
    key_prefix: String,
    /// Receive callback.
    callback: NotificationCallback,
}

/// Shared bus state.
#[derive(Default)]
struct BusState {
    /// Subscribers in registration order.
    subscriptions: Vec<Arc<Subscription>>,
    /// Published notifications awaiting delivery.
    queue: VecDeque<WireNotification>,
    /// When set, publishes fail with this message.
    publish_failure: Option<String>,
}

/// In-process broadcast bus shared by simulated nodes.
///
/// # Invariants
/// - Delivery is at-least-once per subscriber and unordered across publishers.
#[derive(Clone, Default)]
pub struct InMemoryBroadcastBus {
    /// Shared bus state.
    state: Arc<Mutex<BusState>>,
}

impl InMemoryBroadcastBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publishes fail (`Some`) or succeed (`None`).
    pub fn set_publish_failure(&self, message: Option<String>) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).publish_failure = message;
    }

    /// Enqueues a raw message, bypassing the typed codec.
    pub fn publish_raw(&self, key: impl Into<String>, payload: Vec<u8>) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).queue.push_back(
            WireNotification {
                key: key.into(),
                payload,
            },
        );
    }

    /// Returns the number of queued, undelivered notifications.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).queue.len()
    }

    /// Delivers every queued notification to matching subscribers and returns
    /// the number of notifications drained.
    pub fn deliver_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            let (message, subscribers) = {
                let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(message) = guard.queue.pop_front() else {
                    return delivered;
                };
                let subscribers = guard
                    .subscriptions
                    .iter()
                    .filter(|subscription| message.key.starts_with(&subscription.key_prefix))
                    .cloned()
                    .collect::<Vec<_>>();
                drop(guard);
                (message, subscribers)
            };
            for subscription in subscribers {
                (subscription.callback)(&message.key, &message.payload);
            }
            delivered += 1;
        }
    }
}

impl Broadcaster for InMemoryBroadcastBus {
    fn publish(
        &self,
        notification: &ClusterNotification,
        _ttl: Duration,
    ) -> Result<(), BroadcastError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(message) = &guard.publish_failure {
            return Err(BroadcastError::Publish(message.clone()));
        }
        guard.queue.push_back(notification.encode());
        drop(guard);
        Ok(())
    }

    fn subscribe(&self, key_prefix: &str, callback: NotificationCallback) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).subscriptions.push(Arc::new(
            Subscription {
                key_prefix: key_prefix.to_string(),
                callback,
            },
        ));
    }
}

// ============================================================================
// SECTION: No-op Transport
// ============================================================================

/// Broadcaster that discards every notification.
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn publish(
        &self,
        _notification: &ClusterNotification,
        _ttl: Duration,
    ) -> Result<(), BroadcastError> {
        Ok(())
    }

    fn subscribe(&self, _key_prefix: &str, _callback: NotificationCallback) {}
}
