//! In-process asynchronous message bus.
//!
//! Per-topic fan-out to every subscribed handler, each handler scheduled as
//! an independent task so one slow or panicking handler never blocks its
//! siblings or the topic's delivery loop. At-most-once delivery, no
//! cross-process persistence, no ordering guarantee across topics.

mod topic;

pub use topic::Topic;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

/// An asynchronous bus handler. Implementors receive the raw JSON payload
/// published to the topic they subscribed to.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, payload: Value);
}

/// Adapts a plain async closure into a [`Handler`].
struct FnHandler<F>(F);

#[async_trait::async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, payload: Value) {
        (self.0)(payload).await
    }
}

struct TopicState {
    subscribers: Vec<Arc<dyn Handler>>,
    sender: mpsc::UnboundedSender<Value>,
    receiver: Option<mpsc::UnboundedReceiver<Value>>,
}

/// The bus. Cheaply cloneable — internal state is `Arc`-shared.
#[derive(Clone)]
pub struct Bus {
    topics: Arc<RwLock<HashMap<Topic, TopicState>>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn ensure_topic<'a>(
        topics: &mut HashMap<Topic, TopicState>,
        topic: Topic,
    ) -> &mut TopicState {
        topics.entry(topic).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            TopicState {
                subscribers: Vec::new(),
                sender,
                receiver: Some(receiver),
            }
        })
    }

    /// Register an asynchronous handler for `topic`. Idempotently creates
    /// the topic's queue. Multiple handlers per topic are supported; each
    /// receives every message published to the topic.
    pub fn subscribe<F, Fut>(&self, topic: Topic, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.subscribe_handler(topic, Arc::new(FnHandler(handler)));
    }

    pub fn subscribe_handler(&self, topic: Topic, handler: Arc<dyn Handler>) {
        let mut topics = self.topics.write();
        let state = Self::ensure_topic(&mut topics, topic);
        state.subscribers.push(handler);
    }

    /// Enqueue `message` on `topic`. Fails silently (logs only) when the
    /// topic has no subscribers yet — there is no queue to enqueue onto.
    pub fn publish(&self, topic: Topic, message: Value) {
        let topics = self.topics.read();
        match topics.get(&topic) {
            Some(state) if !state.subscribers.is_empty() => {
                if state.sender.send(message).is_err() {
                    tracing::warn!(topic = %topic, "publish failed: topic loop no longer running");
                }
            }
            _ => {
                tracing::debug!(topic = %topic, "publish with no subscribers, dropping");
            }
        }
    }

    /// Start one consumer loop per topic that has at least one subscriber
    /// registered at the time of this call. Each loop dequeues messages in
    /// publish order and dispatches every message to all subscribed
    /// handlers concurrently (one spawned task per handler). Handler
    /// panics are caught, logged, and never propagate to the loop.
    pub fn run_forever(&self) {
        let mut topics = self.topics.write();
        for (topic, state) in topics.iter_mut() {
            let Some(mut receiver) = state.receiver.take() else {
                continue;
            };
            let subscribers = state.subscribers.clone();
            let topic = *topic;
            tokio::spawn(async move {
                while let Some(message) = receiver.recv().await {
                    for handler in &subscribers {
                        let handler = handler.clone();
                        let message = message.clone();
                        tokio::spawn(async move {
                            let result =
                                std::panic::AssertUnwindSafe(handler.handle(message))
                                    .catch_unwind()
                                    .await;
                            if result.is_err() {
                                tracing::error!(topic = %topic, "bus handler panicked");
                            }
                        });
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_silent_noop() {
        let bus = Bus::new();
        bus.publish(Topic::RunsNew, serde_json::json!({"x": 1}));
        // no panic, no delivery target — nothing to assert beyond "didn't blow up"
    }

    #[tokio::test]
    async fn single_subscriber_receives_message() {
        let bus = Bus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(Topic::UiEvents, move |_payload| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        bus.run_forever();
        bus.publish(Topic::UiEvents, serde_json::json!({"event": "run_started"}));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fan_out_to_multiple_subscribers() {
        let bus = Bus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = count.clone();
            bus.subscribe(Topic::ToolsResults, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        bus.run_forever();
        bus.publish(Topic::ToolsResults, serde_json::json!({}));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fifo_order_per_topic_single_subscriber() {
        let bus = Bus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe(Topic::LlmResults, move |payload| {
            let s = s.clone();
            async move {
                s.lock().push(payload["seq"].as_u64().unwrap());
            }
        });
        bus.run_forever();
        for i in 0..10 {
            bus.publish(Topic::LlmResults, serde_json::json!({"seq": i}));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen = seen.lock();
        assert_eq!(*seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn panicking_handler_does_not_kill_the_topic_loop() {
        let bus = Bus::new();
        bus.subscribe(Topic::CommandResult, |_payload| async move {
            panic!("boom");
        });
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(Topic::CommandResult, move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        bus.run_forever();
        bus.publish(Topic::CommandResult, serde_json::json!({}));
        bus.publish(Topic::CommandResult, serde_json::json!({}));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
