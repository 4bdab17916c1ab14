//! Cross-component notification events.
//!
//! The alert engine and aggregator publish here; the broadcast server and the
//! HTTP event stream consume. Listeners are held in an explicit registry and
//! receive events in registration order; every subscription carries an
//! unsubscribe handle (dropping it unregisters the listener).

use crate::core::{RealTimeAlert, RealTimeMetrics};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events flowing between the analytics components.
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    /// A new alert was created by the alert engine.
    NewAlert(RealTimeAlert),
    /// An existing alert was acknowledged.
    AlertAcknowledged(RealTimeAlert),
    /// A fresh real-time metrics snapshot is available.
    RealTimeUpdate(RealTimeMetrics),
    /// A data-source failure occurred during an aggregation operation.
    AnalyticsError { operation: String, message: String },
    /// Source counters changed; cached views may be stale.
    MetricsUpdated,
}

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<AnalyticsEvent>,
}

/// Publish/subscribe registry for [`AnalyticsEvent`]s.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Events published after this call are delivered in
    /// registration order relative to other listeners.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push(Listener { id, tx });
        Subscription {
            guard: SubscriptionGuard {
                id,
                bus: Arc::clone(self),
            },
            rx,
        }
    }

    /// Deliver an event to every live listener, in registration order.
    /// Listeners whose receiver has been dropped are skipped and removed.
    pub fn publish(&self, event: AnalyticsEvent) {
        let mut closed = false;
        {
            let listeners = self.listeners.read();
            for listener in listeners.iter() {
                if listener.tx.send(event.clone()).is_err() {
                    closed = true;
                }
            }
        }
        if closed {
            self.listeners.write().retain(|l| !l.tx.is_closed());
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners.write().retain(|l| l.id != id);
    }
}

/// Unregisters its listener when dropped.
pub struct SubscriptionGuard {
    id: u64,
    bus: Arc<EventBus>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// A live event subscription: receiver plus its unsubscribe guard.
pub struct Subscription {
    guard: SubscriptionGuard,
    rx: mpsc::UnboundedReceiver<AnalyticsEvent>,
}

impl Subscription {
    /// Receive the next event, or None once the bus is gone.
    pub async fn recv(&mut self) -> Option<AnalyticsEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<AnalyticsEvent> {
        self.rx.try_recv().ok()
    }

    /// Split into the raw receiver and the guard, for wiring the receiver into
    /// a stream while keeping the registration alive.
    pub fn split(self) -> (SubscriptionGuard, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        (self.guard, self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RealTimeMetrics;
    use chrono::Utc;

    fn snapshot() -> RealTimeMetrics {
        RealTimeMetrics {
            active_tests: 1,
            total_visitors: 10,
            total_conversions: 1,
            conversion_rate: 0.1,
            unacknowledged_alerts: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_listeners() {
        let bus = Arc::new(EventBus::new());
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(AnalyticsEvent::MetricsUpdated);

        assert!(matches!(a.recv().await, Some(AnalyticsEvent::MetricsUpdated)));
        assert!(matches!(b.recv().await, Some(AnalyticsEvent::MetricsUpdated)));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe();
        assert_eq!(bus.listener_count(), 1);

        drop(sub);
        assert_eq!(bus.listener_count(), 0);

        // Publishing with no listeners must not panic.
        bus.publish(AnalyticsEvent::RealTimeUpdate(snapshot()));
    }

    #[tokio::test]
    async fn test_closed_receiver_is_skipped() {
        let bus = Arc::new(EventBus::new());
        let (guard, rx) = bus.subscribe().split();
        let mut live = bus.subscribe();
        drop(rx); // receiver gone but guard still registered

        bus.publish(AnalyticsEvent::MetricsUpdated);
        assert!(matches!(live.recv().await, Some(AnalyticsEvent::MetricsUpdated)));

        // The dead listener was purged during publish.
        assert_eq!(bus.listener_count(), 1);
        drop(guard);
    }
}
