//! Engine events for the presentation layer

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use vizdeck_core::deck::DeckState;
use vizdeck_core::DeckId;
use vizdeck_midi::MidiMapping;

/// Notifications published by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    DeckStateChanged { deck: DeckId, state: DeckState },
    /// Audio capture kept failing; raised once per failure streak
    AudioWarning(String),
    MidiLearned(MidiMapping),
    PresetChanged { deck: DeckId, path: PathBuf },
}

/// Broadcast of engine events to any number of subscribers
///
/// Every subscriber gets its own bounded queue. Publishing never blocks the
/// engine: a subscriber that falls behind misses events once its queue is
/// full, and dropped receivers are pruned on the next publish. Clones share
/// the subscriber list.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<EngineEvent>>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscriber queues hold `capacity` events each
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Receiver for every event published from now on
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (sender, receiver) = channel::bounded(self.capacity);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(sender);
        }
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Publish an event; returns how many subscribers received it
    pub fn publish(&self, event: EngineEvent) -> usize {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };
        let mut delivered = 0;
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                log::debug!("Engine: subscriber queue full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_each_event() {
        let bus = EventBus::new(16);
        let first = bus.subscribe();
        let second = bus.clone().subscribe();

        assert_eq!(bus.publish(EngineEvent::AudioWarning("test".to_string())), 2);
        assert_eq!(
            first.try_recv().unwrap(),
            EngineEvent::AudioWarning("test".to_string())
        );
        assert_eq!(
            second.try_recv().unwrap(),
            EngineEvent::AudioWarning("test".to_string())
        );
    }

    #[test]
    fn test_no_subscribers_keeps_nothing() {
        let bus = EventBus::new(1);
        assert_eq!(bus.publish(EngineEvent::AudioWarning("stale".into())), 0);

        // A late subscriber sees only newer events
        let rx = bus.subscribe();
        assert_eq!(bus.publish(EngineEvent::AudioWarning("fresh".into())), 1);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_slow_subscriber_does_not_block_others() {
        let bus = EventBus::new(1);
        let slow = bus.subscribe();
        let fast = bus.subscribe();

        assert_eq!(bus.publish(EngineEvent::AudioWarning("a".into())), 2);
        fast.try_recv().unwrap();
        assert_eq!(bus.publish(EngineEvent::AudioWarning("b".into())), 1);
        assert_eq!(fast.try_recv().unwrap(), EngineEvent::AudioWarning("b".into()));
        assert_eq!(slow.try_iter().count(), 1);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new(4);
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.publish(EngineEvent::AudioWarning("x".into())), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }
}
