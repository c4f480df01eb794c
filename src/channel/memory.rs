use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Channel, Subscription};
use crate::error::ChannelError;
use crate::types::{Envelope, Topic};

struct Subscriber {
    topics: HashSet<Topic>,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Subscriber>,
    /// Only populated when created with [`MemoryBus::with_history`].
    history: Option<Vec<Envelope>>,
    duplicate_delivery: bool,
    muted_senders: HashSet<String>,
    failing_publishes: u32,
}

/// In-process pub/sub bus. Each subscriber sees messages in publish order.
///
/// Delivered envelopes are not retained unless the bus is created with
/// [`MemoryBus::with_history`]. Fault hooks let tests model an unreliable
/// transport: duplicated delivery, a sender whose messages never arrive, and
/// transient publish failures.
#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that also keeps every delivered envelope for inspection.
    pub fn with_history() -> Self {
        let bus = Self::default();
        bus.state().history = Some(Vec::new());
        bus
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deliver every message twice.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.state().duplicate_delivery = enabled;
    }

    /// Silently drop everything published by `sender`.
    pub fn mute_sender(&self, sender: impl Into<String>) {
        self.state().muted_senders.insert(sender.into());
    }

    /// Make the next `count` publishes fail with `ChannelError::Disconnected`.
    pub fn fail_next_publishes(&self, count: u32) {
        self.state().failing_publishes = count;
    }

    /// Every envelope accepted by the bus, in order. Empty unless the bus
    /// records history.
    pub fn history(&self) -> Vec<Envelope> {
        self.state().history.clone().unwrap_or_default()
    }

    pub fn published_on(&self, topic: Topic) -> Vec<Envelope> {
        self.state()
            .history
            .iter()
            .flatten()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    /// Decodes a wire-format message and delivers it. Malformed input is
    /// dropped and reported to the caller.
    pub fn publish_raw(&self, topic: Topic, raw: &str) -> Result<(), ChannelError> {
        match Envelope::from_json(topic, raw) {
            Ok(envelope) => {
                self.deliver(envelope);
                Ok(())
            }
            Err(e) => {
                log::warn!("Dropping malformed message on {}: {}", topic.as_str(), e);
                Err(e)
            }
        }
    }

    fn deliver(&self, envelope: Envelope) {
        let mut state = self.state();
        if state.muted_senders.contains(&envelope.sender) {
            log::debug!("Dropped message from muted sender {}", envelope.sender);
            return;
        }

        let copies = if state.duplicate_delivery { 2 } else { 1 };
        state.subscribers.retain(|s| !s.tx.is_closed());
        for subscriber in &state.subscribers {
            if !subscriber.topics.contains(&envelope.topic) {
                continue;
            }
            for _ in 0..copies {
                let _ = subscriber.tx.send(envelope.clone());
            }
        }
        if let Some(history) = state.history.as_mut() {
            history.push(envelope);
        }
    }
}

#[async_trait]
impl Channel for MemoryBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError> {
        {
            let mut state = self.state();
            if state.failing_publishes > 0 {
                state.failing_publishes -= 1;
                return Err(ChannelError::Disconnected(
                    "simulated connection loss".to_string(),
                ));
            }
        }
        self.deliver(envelope);
        Ok(())
    }

    async fn subscribe(&self, topics: &[Topic]) -> Result<Subscription, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().subscribers.push(Subscriber {
            topics: topics.iter().copied().collect(),
            tx,
        });
        Ok(Subscription::new(UnboundedReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Payload, StopNotice};
    use futures::StreamExt;

    fn stop_from(sender: &str) -> Envelope {
        Envelope::new(sender, Payload::Stop(StopNotice { stop: true }))
    }

    #[tokio::test]
    async fn test_delivers_only_subscribed_topics() {
        let bus = MemoryBus::new();
        let mut stops = bus.subscribe(&[Topic::Stop]).await.unwrap();
        let mut registers = bus.subscribe(&[Topic::Register]).await.unwrap();

        bus.publish(stop_from("coordinator")).await.unwrap();

        let received = stops.next().await.unwrap();
        assert_eq!(received.topic, Topic::Stop);

        let nothing =
            tokio::time::timeout(std::time::Duration::from_millis(20), registers.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_delivery() {
        let bus = MemoryBus::new();
        bus.set_duplicate_delivery(true);
        let mut sub = bus.subscribe(&[Topic::Stop]).await.unwrap();

        bus.publish(stop_from("coordinator")).await.unwrap();

        let first = sub.next().await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_muted_sender_is_dropped() {
        let bus = MemoryBus::with_history();
        bus.mute_sender("ghost");
        let mut sub = bus.subscribe(&[Topic::Stop]).await.unwrap();

        bus.publish(stop_from("ghost")).await.unwrap();
        bus.publish(stop_from("coordinator")).await.unwrap();

        assert_eq!(sub.next().await.unwrap().sender, "coordinator");
        assert_eq!(bus.history().len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_disconnect() {
        let bus = MemoryBus::new();
        bus.fail_next_publishes(1);

        let err = bus.publish(stop_from("coordinator")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(bus.publish(stop_from("coordinator")).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_raw_rejects_garbage() {
        let bus = MemoryBus::with_history();
        let mut sub = bus.subscribe(&[Topic::Stop]).await.unwrap();
        assert!(bus.publish_raw(Topic::Stop, "garbage").is_err());
        assert!(bus.publish_raw(Topic::Stop, r#"{"stop": "yes"}"#).is_err());
        assert!(bus.history().is_empty());

        let raw = stop_from("coordinator").to_json().unwrap();
        bus.publish_raw(Topic::Stop, &raw).unwrap();
        assert_eq!(bus.published_on(Topic::Stop).len(), 1);
        // The subscriber only ever sees the well-formed message.
        assert_eq!(sub.next().await.unwrap().sender, "coordinator");
    }

    #[tokio::test]
    async fn test_history_is_opt_in() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(&[Topic::Stop]).await.unwrap();
        for _ in 0..3 {
            bus.publish(stop_from("coordinator")).await.unwrap();
        }

        for _ in 0..3 {
            assert_eq!(sub.next().await.unwrap().topic, Topic::Stop);
        }
        assert!(bus.history().is_empty());
        assert!(bus.published_on(Topic::Stop).is_empty());

        let recording = MemoryBus::with_history();
        recording.publish(stop_from("coordinator")).await.unwrap();
        assert_eq!(recording.history().len(), 1);
    }
}
