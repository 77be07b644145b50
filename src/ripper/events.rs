use super::types::RipperEvent;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc as tokio_mpsc;

/// Fans ripper events out to every live subscriber
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    subscribers: Arc<Mutex<Vec<tokio_mpsc::UnboundedSender<RipperEvent>>>>,
}

impl EventBroadcaster {
    fn subscribers(&self) -> MutexGuard<'_, Vec<tokio_mpsc::UnboundedSender<RipperEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscription is automatically removed when the receiver is dropped
    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<RipperEvent> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        self.subscribers().push(tx);
        rx
    }

    pub fn emit(&self, event: RipperEvent) {
        // If send fails, receiver was dropped
        self.subscribers()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let events = EventBroadcaster::default();
        let mut first = events.subscribe();
        let mut second = events.subscribe();

        events.emit(RipperEvent::ProgressUpdated(12));

        assert_eq!(first.try_recv().unwrap(), RipperEvent::ProgressUpdated(12));
        assert_eq!(second.try_recv().unwrap(), RipperEvent::ProgressUpdated(12));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let events = EventBroadcaster::default();
        let _kept = events.subscribe();
        drop(events.subscribe());

        events.emit(RipperEvent::Cancelled);
        assert_eq!(events.subscriber_count(), 1);
    }
}
