//! Per-run and per-owner fan-out queues feeding the SSE boundary (spec
//! §4.8, §5).
//!
//! Each queue has exactly one producer — the bus handler routing
//! `ui.events` or `command.result` — and one or more consumers driving an
//! HTTP response stream. Registration and routing share one lock per map
//! so a route can never race a concurrent register/unregister.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-run SSE queues, keyed by run id. A run's queue is removed once its
/// terminal `run_finished` event has been routed.
#[derive(Default)]
pub struct RunQueues {
    queues: RwLock<HashMap<String, mpsc::UnboundedSender<Value>>>,
}

impl RunQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: impl Into<String>) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.write().insert(run_id.into(), tx);
        rx
    }

    /// Routes `event` to `run_id`'s queue, if one is still registered.
    pub fn route(&self, run_id: &str, event: Value) {
        if let Some(tx) = self.queues.read().get(run_id) {
            let _ = tx.send(event);
        }
    }

    pub fn unregister(&self, run_id: &str) {
        self.queues.write().remove(run_id);
    }
}

/// Per-owner persistent queues, keyed by owner key then connection id — an
/// owner may hold more than one open `/stream/{public_key}` connection at
/// once, each fed independently.
#[derive(Default)]
pub struct OwnerQueues {
    queues: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<Value>>>>,
}

impl OwnerQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, owner_key: impl Into<String>) -> (Uuid, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.queues.write().entry(owner_key.into()).or_default().insert(id, tx);
        (id, rx)
    }

    /// Fans `event` out to every connection open for `owner_key`.
    pub fn route(&self, owner_key: &str, event: Value) {
        if let Some(conns) = self.queues.read().get(owner_key) {
            for tx in conns.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub fn unregister(&self, owner_key: &str, id: Uuid) {
        let mut queues = self.queues.write();
        if let Some(conns) = queues.get_mut(owner_key) {
            conns.remove(&id);
            if conns.is_empty() {
                queues.remove(owner_key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_queue_routes_only_to_its_own_run() {
        let queues = RunQueues::new();
        let mut rx = queues.register("run_1");
        queues.route("run_1", serde_json::json!({"x": 1}));
        queues.route("run_2", serde_json::json!({"x": 2}));
        assert_eq!(rx.recv().await, Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn unregistered_run_drops_events_silently() {
        let queues = RunQueues::new();
        queues.route("run_ghost", serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn owner_queue_fans_out_to_every_open_connection() {
        let queues = OwnerQueues::new();
        let (_id1, mut rx1) = queues.register("0xabc");
        let (_id2, mut rx2) = queues.register("0xabc");
        queues.route("0xabc", serde_json::json!({"e": 1}));
        assert_eq!(rx1.recv().await, Some(serde_json::json!({"e": 1})));
        assert_eq!(rx2.recv().await, Some(serde_json::json!({"e": 1})));
    }

    #[tokio::test]
    async fn unregister_removes_only_that_connection() {
        let queues = OwnerQueues::new();
        let (id1, _rx1) = queues.register("0xabc");
        let (_id2, mut rx2) = queues.register("0xabc");
        queues.unregister("0xabc", id1);
        queues.route("0xabc", serde_json::json!({"e": 1}));
        assert_eq!(rx2.recv().await, Some(serde_json::json!({"e": 1})));
    }
}
