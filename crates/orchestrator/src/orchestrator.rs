use std::sync::Arc;

use nx_bus::{Bus, Topic};
use nx_domain::config::Config;
use nx_domain::models::{Message as BusMessage, MessageContent, Role, Run, RunStatus};
use nx_domain::tool::{Message as ToolMessage, ToolCall, ToolDefinition};
use nx_identity::IdentityService;
use serde_json::Value;

use crate::messages::{append_tool_calls_message, append_tool_result_message};
use crate::state::ActiveRuns;

/// Subscribes the orchestrator's four handlers to the bus. Returns the
/// shared `active_runs` map so callers (tests, admin endpoints) can
/// inspect it.
pub fn register(bus: &Bus, identity: Arc<IdentityService>, config: Arc<Config>) -> Arc<ActiveRuns> {
    let active_runs = Arc::new(ActiveRuns::new());

    {
        let bus2 = bus.clone();
        let identity = identity.clone();
        let config = config.clone();
        let active_runs = active_runs.clone();
        bus.subscribe(Topic::RunsNew, move |payload| {
            let bus2 = bus2.clone();
            let identity = identity.clone();
            let config = config.clone();
            let active_runs = active_runs.clone();
            async move {
                handle_runs_new(&bus2, &identity, &config, &active_runs, payload).await;
            }
        });
    }

    {
        let bus2 = bus.clone();
        let active_runs = active_runs.clone();
        bus.subscribe(Topic::ContextBuildResponse, move |payload| {
            let bus2 = bus2.clone();
            let active_runs = active_runs.clone();
            async move {
                handle_context_build_response(&bus2, &active_runs, payload).await;
            }
        });
    }

    {
        let bus2 = bus.clone();
        let config = config.clone();
        let active_runs = active_runs.clone();
        bus.subscribe(Topic::LlmResults, move |payload| {
            let bus2 = bus2.clone();
            let config = config.clone();
            let active_runs = active_runs.clone();
            async move {
                handle_llm_results(&bus2, &config, &active_runs, payload).await;
            }
        });
    }

    {
        let bus2 = bus.clone();
        let active_runs = active_runs.clone();
        bus.subscribe(Topic::ToolsResults, move |payload| {
            let bus2 = bus2.clone();
            let active_runs = active_runs.clone();
            async move {
                handle_tools_results(&bus2, &active_runs, payload).await;
            }
        });
    }

    active_runs
}

fn parse_envelope(payload: Value) -> Option<BusMessage> {
    match serde_json::from_value(payload) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "orchestrator: malformed bus payload, dropping");
            None
        }
    }
}

async fn handle_runs_new(
    bus: &Bus,
    identity: &IdentityService,
    config: &Config,
    active_runs: &ActiveRuns,
    payload: Value,
) {
    let Some(envelope) = parse_envelope(payload) else { return };
    let Some(run) = envelope.content.as_run() else {
        tracing::warn!("orchestrator: runs.new payload carries no run");
        return;
    };
    let mut run: Run = (**run).clone();

    identity.get_or_create_identity(&run.owner_key);
    let profile = identity.get_effective_profile(&run.owner_key, config);
    run.metadata.insert(
        "user_profile".into(),
        serde_json::to_value(&profile).unwrap_or(Value::Null),
    );
    run.status = RunStatus::BuildingContext;

    publish_ui_event(bus, &run.id, &run.owner_key, "run_started", serde_json::json!({}));
    publish_context_build_request(bus, &run);
    active_runs.insert(run);
}

async fn handle_context_build_response(bus: &Bus, active_runs: &ActiveRuns, payload: Value) {
    let Some(envelope) = parse_envelope(payload) else { return };
    let Some(run_lock) = active_runs.get(&envelope.run_id) else {
        tracing::debug!(run_id = %envelope.run_id, "orchestrator: context.build.response for unknown run");
        return;
    };
    let Some(map) = envelope.content.as_map() else { return };
    let status = map.get("status").and_then(|v| v.as_str()).unwrap_or("error");

    if status == "success" {
        let tools: Vec<ToolDefinition> = map
            .get("tools")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let messages: Vec<ToolMessage> = map
            .get("messages")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let (run_id, owner_key) = {
            let mut run = run_lock.lock().await;
            run.tools = tools.clone();
            run.metadata.insert(
                "llm_messages".into(),
                serde_json::to_value(&messages).unwrap_or(Value::Null),
            );
            run.status = RunStatus::AwaitingLlmDecision;
            (run.id.clone(), run.owner_key.clone())
        };
        publish_llm_requests(bus, &run_id, &owner_key, &messages, &tools);
    } else {
        let run_id = envelope.run_id.clone();
        let owner_key = envelope.owner_key.clone();
        {
            let mut run = run_lock.lock().await;
            run.status = RunStatus::Failed;
        }
        publish_ui_event(
            bus,
            &run_id,
            &owner_key,
            "error",
            serde_json::json!({"message": "context build failed"}),
        );
        publish_run_finished(bus, &run_id, &owner_key, "failed");
        active_runs.remove(&run_id);
    }
}

async fn handle_llm_results(bus: &Bus, config: &Config, active_runs: &ActiveRuns, payload: Value) {
    let Some(envelope) = parse_envelope(payload) else { return };

    if envelope.role == Role::System {
        bus.publish(Topic::UiEvents, serde_json::to_value(&envelope).unwrap());
        return;
    }

    let Some(run_lock) = active_runs.get(&envelope.run_id) else {
        tracing::debug!(run_id = %envelope.run_id, "orchestrator: llm.results for unknown run");
        return;
    };
    let Some(map) = envelope.content.as_map() else { return };
    let content_text = map.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let tool_calls: Vec<ToolCall> = match map.get("tool_calls") {
        Some(Value::Array(_)) => map
            .get("tool_calls")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    if tool_calls.is_empty() {
        let (run_id, owner_key) = {
            let mut run = run_lock.lock().await;
            run.history.push(BusMessage::new(
                run.id.clone(),
                run.owner_key.clone(),
                Role::Ai,
                MessageContent::Text(content_text),
            ));
            run.status = RunStatus::Completed;
            (run.id.clone(), run.owner_key.clone())
        };
        publish_run_finished(bus, &run_id, &owner_key, "completed");
        active_runs.remove(&run_id);
        return;
    }

    let max_iterations = config.system.max_tool_iterations;
    let at_cap = {
        let run = run_lock.lock().await;
        run.iteration_count >= max_iterations
    };

    if at_cap {
        let (run_id, owner_key) = {
            let mut run = run_lock.lock().await;
            run.status = RunStatus::TimedOut;
            (run.id.clone(), run.owner_key.clone())
        };
        publish_ui_event(
            bus,
            &run_id,
            &owner_key,
            "error",
            serde_json::json!({"message": "Maximum tool iterations exceeded"}),
        );
        publish_run_finished(bus, &run_id, &owner_key, "timed_out");
        active_runs.remove(&run_id);
        return;
    }

    let (run_id, owner_key) = {
        let mut run = run_lock.lock().await;
        run.history.push(BusMessage::new(
            run.id.clone(),
            run.owner_key.clone(),
            Role::Ai,
            MessageContent::Text(content_text),
        ));
        run.iteration_count += 1;
        run.set_pending_tool_calls(tool_calls.len() as u32);
        run.status = RunStatus::AwaitingToolResult;

        let mut llm_messages: Vec<ToolMessage> = run
            .metadata
            .get("llm_messages")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        append_tool_calls_message(&mut llm_messages, &tool_calls);
        run.metadata.insert(
            "llm_messages".into(),
            serde_json::to_value(&llm_messages).unwrap_or(Value::Null),
        );
        (run.id.clone(), run.owner_key.clone())
    };

    for call in &tool_calls {
        publish_ui_event(
            bus,
            &run_id,
            &owner_key,
            "tool_call_started",
            serde_json::json!({"tool_name": call.tool_name, "call_id": call.call_id}),
        );
        publish_tools_request(bus, &run_id, &owner_key, call);
    }
}

async fn handle_tools_results(bus: &Bus, active_runs: &ActiveRuns, payload: Value) {
    let Some(envelope) = parse_envelope(payload) else { return };
    let Some(run_lock) = active_runs.get(&envelope.run_id) else {
        tracing::debug!(run_id = %envelope.run_id, "orchestrator: tools.results for unknown run");
        return;
    };
    let Some(map) = envelope.content.as_map() else { return };
    let result = map.get("result").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let status = map.get("status").and_then(|v| v.as_str()).unwrap_or("error").to_string();
    let tool_name = map.get("tool_name").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let call_id = map.get("call_id").and_then(|v| v.as_str()).unwrap_or("").to_string();

    let (run_id, owner_key, should_advance, messages, tools) = {
        let mut run = run_lock.lock().await;
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("tool_name".into(), serde_json::json!(tool_name));
        metadata.insert("status".into(), serde_json::json!(status.clone()));
        metadata.insert("call_id".into(), serde_json::json!(call_id.clone()));
        run.history.push(
            BusMessage::new(run.id.clone(), run.owner_key.clone(), Role::Tool, MessageContent::Text(result.clone()))
                .with_metadata(metadata),
        );

        let mut llm_messages: Vec<ToolMessage> = run
            .metadata
            .get("llm_messages")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        append_tool_result_message(&mut llm_messages, &call_id, &result);
        run.metadata.insert(
            "llm_messages".into(),
            serde_json::to_value(&llm_messages).unwrap_or(Value::Null),
        );

        let remaining = run.pending_tool_calls().saturating_sub(1);
        run.set_pending_tool_calls(remaining);

        let should_advance = remaining == 0;
        if should_advance {
            run.status = RunStatus::AwaitingLlmDecision;
        }
        (run.id.clone(), run.owner_key.clone(), should_advance, llm_messages, run.tools.clone())
    };

    publish_ui_event(
        bus,
        &run_id,
        &owner_key,
        "tool_call_finished",
        serde_json::json!({"tool_name": tool_name, "call_id": call_id, "status": status}),
    );

    if should_advance {
        publish_llm_requests(bus, &run_id, &owner_key, &messages, &tools);
    }
}

fn publish_ui_event(bus: &Bus, run_id: &str, owner_key: &str, event: &str, payload: Value) {
    let mut content = serde_json::Map::new();
    content.insert("event".into(), serde_json::json!(event));
    content.insert("run_id".into(), serde_json::json!(run_id));
    content.insert("payload".into(), payload);
    let message = BusMessage::new(run_id, owner_key, Role::System, MessageContent::Map(content));
    bus.publish(Topic::UiEvents, serde_json::to_value(message).unwrap());
}

fn publish_run_finished(bus: &Bus, run_id: &str, owner_key: &str, status: &str) {
    publish_ui_event(bus, run_id, owner_key, "run_finished", serde_json::json!({"status": status}));
}

fn publish_context_build_request(bus: &Bus, run: &Run) {
    let message = BusMessage::new(
        run.id.clone(),
        run.owner_key.clone(),
        Role::System,
        MessageContent::Run(Box::new(run.clone())),
    );
    bus.publish(Topic::ContextBuildRequest, serde_json::to_value(message).unwrap());
}

fn publish_llm_requests(bus: &Bus, run_id: &str, owner_key: &str, messages: &[ToolMessage], tools: &[ToolDefinition]) {
    let mut content = serde_json::Map::new();
    content.insert("messages".into(), serde_json::to_value(messages).unwrap_or(Value::Null));
    content.insert("tools".into(), serde_json::to_value(tools).unwrap_or(Value::Null));
    let message = BusMessage::new(run_id, owner_key, Role::System, MessageContent::Map(content));
    bus.publish(Topic::LlmRequests, serde_json::to_value(message).unwrap());
}

fn publish_tools_request(bus: &Bus, run_id: &str, owner_key: &str, call: &ToolCall) {
    let mut content = serde_json::Map::new();
    content.insert("name".into(), serde_json::json!(call.tool_name));
    content.insert("args".into(), call.arguments.clone());
    content.insert("call_id".into(), serde_json::json!(call.call_id));
    let message = BusMessage::new(run_id, owner_key, Role::System, MessageContent::Map(content));
    bus.publish(Topic::ToolsRequests, serde_json::to_value(message).unwrap());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn new_identity() -> (Arc<IdentityService>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (Arc::new(IdentityService::new(dir.path())), dir)
    }

    #[tokio::test]
    async fn runs_new_moves_run_to_building_context_and_publishes_context_request() {
        let bus = Bus::new();
        let received = Arc::new(tokio::sync::Mutex::new(None));
        let r = received.clone();
        bus.subscribe(Topic::ContextBuildRequest, move |payload| {
            let r = r.clone();
            async move {
                *r.lock().await = Some(payload);
            }
        });
        bus.run_forever();

        let (identity, _dir) = new_identity();
        let config = Arc::new(Config::default());
        let active_runs = register(&bus, identity, config);

        let mut run = Run::new("0xabc");
        run.history.push(BusMessage::new(
            run.id.clone(),
            "0xabc",
            Role::Human,
            MessageContent::Text("hello".into()),
        ));
        let run_id = run.id.clone();
        let envelope = BusMessage::new(run.id.clone(), run.owner_key.clone(), Role::System, MessageContent::Run(Box::new(run)));
        bus.publish(Topic::RunsNew, serde_json::to_value(envelope).unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(received.lock().await.is_some());
        let stored = active_runs.get(&run_id).unwrap();
        assert_eq!(stored.lock().await.status, RunStatus::BuildingContext);
    }

    #[tokio::test]
    async fn llm_results_without_tool_calls_completes_the_run() {
        let bus = Bus::new();
        let finished = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let f = finished.clone();
        bus.subscribe(Topic::UiEvents, move |payload| {
            let f = f.clone();
            async move {
                f.lock().await.push(payload);
            }
        });
        bus.run_forever();

        let (identity, _dir) = new_identity();
        let config = Arc::new(Config::default());
        let active_runs = register(&bus, identity, config);

        let run = Run::new("0xabc");
        let run_id = run.id.clone();
        active_runs.insert(run);

        let mut content = serde_json::Map::new();
        content.insert("content".into(), serde_json::json!("all done"));
        content.insert("tool_calls".into(), Value::Null);
        let envelope = BusMessage::new(run_id.clone(), "0xabc", Role::Ai, MessageContent::Map(content));
        bus.publish(Topic::LlmResults, serde_json::to_value(envelope).unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(active_runs.get(&run_id).is_none());
        let events = finished.lock().await;
        assert!(events.iter().any(|e| e.to_string().contains("run_finished")));
    }

    #[tokio::test]
    async fn llm_results_at_iteration_cap_times_out() {
        let bus = Bus::new();
        bus.run_forever();

        let (identity, _dir) = new_identity();
        let mut cfg = Config::default();
        cfg.system.max_tool_iterations = 1;
        let config = Arc::new(cfg);
        let active_runs = register(&bus, identity, config);

        let mut run = Run::new("0xabc");
        run.iteration_count = 1;
        let run_id = run.id.clone();
        active_runs.insert(run);

        let mut content = serde_json::Map::new();
        content.insert("content".into(), serde_json::json!(""));
        content.insert(
            "tool_calls".into(),
            serde_json::json!([{"call_id": "c1", "tool_name": "echo", "arguments": {}}]),
        );
        let envelope = BusMessage::new(run_id.clone(), "0xabc", Role::Ai, MessageContent::Map(content));
        bus.publish(Topic::LlmResults, serde_json::to_value(envelope).unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(active_runs.get(&run_id).is_none());
    }

    #[tokio::test]
    async fn tools_results_advances_only_after_all_calls_complete() {
        let bus = Bus::new();
        let llm_requests = Arc::new(tokio::sync::Mutex::new(0));
        let l = llm_requests.clone();
        bus.subscribe(Topic::LlmRequests, move |_payload| {
            let l = l.clone();
            async move {
                *l.lock().await += 1;
            }
        });
        bus.run_forever();

        let (identity, _dir) = new_identity();
        let config = Arc::new(Config::default());
        let active_runs = register(&bus, identity, config);

        let mut run = Run::new("0xabc");
        run.set_pending_tool_calls(2);
        run.status = RunStatus::AwaitingToolResult;
        let run_id = run.id.clone();
        active_runs.insert(run);

        let mut content1 = serde_json::Map::new();
        content1.insert("result".into(), serde_json::json!("r1"));
        content1.insert("status".into(), serde_json::json!("success"));
        content1.insert("tool_name".into(), serde_json::json!("echo"));
        content1.insert("call_id".into(), serde_json::json!("c1"));
        let envelope1 = BusMessage::new(run_id.clone(), "0xabc", Role::Tool, MessageContent::Map(content1));
        bus.publish(Topic::ToolsResults, serde_json::to_value(envelope1).unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*llm_requests.lock().await, 0);

        let mut content2 = serde_json::Map::new();
        content2.insert("result".into(), serde_json::json!("r2"));
        content2.insert("status".into(), serde_json::json!("success"));
        content2.insert("tool_name".into(), serde_json::json!("clock"));
        content2.insert("call_id".into(), serde_json::json!("c2"));
        let envelope2 = BusMessage::new(run_id.clone(), "0xabc", Role::Tool, MessageContent::Map(content2));
        bus.publish(Topic::ToolsResults, serde_json::to_value(envelope2).unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*llm_requests.lock().await, 1);
        assert_eq!(active_runs.get(&run_id).unwrap().lock().await.status, RunStatus::AwaitingLlmDecision);
    }
}
