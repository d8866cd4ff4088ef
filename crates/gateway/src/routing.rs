//! Wires the bus's `ui.events` and `command.result` topics into the
//! per-run and per-owner SSE queues (spec §4.8, §5).

use std::sync::Arc;

use nx_bus::{Bus, Topic};
use nx_domain::models::Message as BusMessage;

use crate::queues::{OwnerQueues, RunQueues};

pub fn register(bus: &Bus, run_queues: Arc<RunQueues>, owner_queues: Arc<OwnerQueues>) {
    bus.subscribe(Topic::UiEvents, move |payload| {
        let run_queues = run_queues.clone();
        async move {
            let Ok(envelope) = serde_json::from_value::<BusMessage>(payload) else {
                return;
            };
            let Some(map) = envelope.content.as_map() else {
                return;
            };
            let event = map.get("event").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let payload = map.get("payload").cloned().unwrap_or(serde_json::Value::Null);

            run_queues.route(&envelope.run_id, serde_json::json!({"event": event, "payload": payload}));
            if event == "run_finished" {
                run_queues.unregister(&envelope.run_id);
            }
        }
    });

    bus.subscribe(Topic::CommandResult, move |payload| {
        let owner_queues = owner_queues.clone();
        async move {
            let Ok(envelope) = serde_json::from_value::<BusMessage>(payload) else {
                return;
            };
            owner_queues.route(
                &envelope.owner_key,
                serde_json::to_value(&envelope).unwrap_or(serde_json::Value::Null),
            );
        }
    });
}
