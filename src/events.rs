//! Multi-subscriber event channel for feed notifications.

use crate::error::FeedFailure;
use crate::types::{ChangeRecord, FeedPosition};
use tokio::sync::broadcast;

/// Buffered events per subscriber before the oldest are overwritten.
const EVENT_BUFFER: usize = 1024;

/// A notification published by the poll loop.
///
/// ## Ordering
///
/// Within one exchange, `Change` events always precede the `Batch` event for
/// the same page, which precedes the `Seq` event for that exchange; `End` is
/// last. Events of different exchanges never interleave.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// One change entry, in server order
    Change(ChangeRecord),
    /// The full ordered page the preceding `Change` events came from
    Batch(Vec<ChangeRecord>),
    /// The position advanced; safe to persist as a resume checkpoint
    Seq(FeedPosition),
    /// An exchange failed; the loop halts only if the failure was fatal
    Error(FeedFailure),
    /// Bounded mode caught up to the tail; the loop has halted
    End,
}

/// Publisher side of the event channel. The poll loop is the sole publisher.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Publish without blocking. With no subscribers attached the event is
    /// simply dropped.
    pub(crate) fn publish(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer handle to the event channel.
///
/// Subscriptions may be created at any time, including after events have
/// begun flowing; there is no replay, so a late subscriber misses earlier
/// events. A subscriber that falls more than the channel buffer behind skips
/// ahead, losing the lagged span.
pub struct Subscription {
    rx: broadcast::Receiver<FeedEvent>,
}

impl Subscription {
    /// Receive the next event.
    ///
    /// Returns `None` once the owning feed has been dropped and all buffered
    /// events have been consumed.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(skipped, "subscriber lagged, skipping ahead");
                    #[cfg(not(feature = "tracing"))]
                    let _ = skipped;
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(id: &str) -> ChangeRecord {
        ChangeRecord {
            id: id.to_string(),
            changes: vec![],
            doc: None,
            deleted: None,
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(FeedEvent::Change(record("doc-1")));

        for sub in [&mut a, &mut b] {
            match sub.recv().await {
                Some(FeedEvent::Change(c)) => assert_eq!(c.id, "doc-1"),
                other => panic!("expected change event, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        let mut early = bus.subscribe();

        bus.publish(FeedEvent::Change(record("before")));
        let mut late = bus.subscribe();
        bus.publish(FeedEvent::End);

        match early.recv().await {
            Some(FeedEvent::Change(c)) => assert_eq!(c.id, "before"),
            other => panic!("expected change event, got {:?}", other),
        }
        assert!(matches!(early.recv().await, Some(FeedEvent::End)));

        // The late subscriber sees only what was published after it joined.
        assert!(matches!(late.recv().await, Some(FeedEvent::End)));
        drop(bus);
        assert!(late.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_block() {
        let bus = EventBus::new();
        let done = tokio::time::timeout(Duration::from_millis(100), async {
            bus.publish(FeedEvent::End);
        })
        .await;
        assert!(done.is_ok());
    }
}
