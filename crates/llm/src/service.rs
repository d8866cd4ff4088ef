//! Wires the provider registry to the bus: consumes `llm.requests`, drives
//! the selected provider's streaming completion, forwards content deltas to
//! `ui.events`, and publishes the final `llm.results` (spec §4.5).

use std::sync::Arc;

use futures_util::StreamExt;
use nx_bus::{Bus, Topic};
use nx_domain::models::{Message as BusMessage, MessageContent, Role};
use nx_domain::stream::StreamEvent;
use nx_domain::tool::{Message, ToolCall, ToolDefinition};

use crate::registry::ProviderRegistry;
use crate::traits::ChatRequest;

pub fn register(bus: &Bus, registry: Arc<ProviderRegistry>) {
    let publish_bus = bus.clone();
    bus.subscribe(Topic::LlmRequests, move |payload| {
        let registry = registry.clone();
        let bus = publish_bus.clone();
        async move {
            let envelope: BusMessage = match serde_json::from_value(payload) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "llm service: malformed request, dropping");
                    return;
                }
            };
            run_request(&bus, &envelope, &registry).await;
        }
    });
}

async fn run_request(bus: &Bus, envelope: &BusMessage, registry: &ProviderRegistry) {
    let Some(map) = envelope.content.as_map() else {
        tracing::warn!("llm service: llm.requests payload is not a map, dropping");
        return;
    };

    let messages: Vec<Message> = map
        .get("messages")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let tools: Vec<ToolDefinition> = map
        .get("tools")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let provider = registry.list_providers().into_iter().next().and_then(|id| registry.get(&id));

    let Some(provider) = provider else {
        publish_error(bus, envelope, "no LLM provider configured");
        return;
    };

    let request = ChatRequest {
        messages,
        tools,
        temperature: None,
        max_tokens: None,
        model: None,
        stream: true,
    };

    let stream = match provider.chat_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            publish_error(bus, envelope, &e.to_string());
            return;
        }
    };

    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    tokio::pin!(stream);

    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::Token { text }) => {
                content.push_str(&text);
                publish_chunk(bus, envelope, &text);
            }
            Ok(StreamEvent::ToolCallFinished { call_id, tool_name, arguments }) => {
                tool_calls.push(ToolCall { call_id, tool_name, arguments });
            }
            Ok(StreamEvent::ToolCallStarted { .. }) | Ok(StreamEvent::ToolCallDelta { .. }) => {}
            Ok(StreamEvent::Done { .. }) => break,
            Ok(StreamEvent::Error { message }) => {
                publish_error(bus, envelope, &message);
                return;
            }
            Err(e) => {
                publish_error(bus, envelope, &e.to_string());
                return;
            }
        }
    }

    publish_result(bus, envelope, content, tool_calls);
}

fn publish_chunk(bus: &Bus, envelope: &BusMessage, chunk: &str) {
    let mut content = serde_json::Map::new();
    content.insert("event".into(), serde_json::json!("text_chunk"));
    content.insert("run_id".into(), serde_json::json!(envelope.run_id));
    content.insert(
        "payload".into(),
        serde_json::json!({"chunk": chunk, "is_final": false}),
    );
    let ui_event = BusMessage::new(
        envelope.run_id.clone(),
        envelope.owner_key.clone(),
        Role::System,
        MessageContent::Map(content),
    );
    bus.publish(Topic::UiEvents, serde_json::to_value(ui_event).unwrap());
}

fn publish_result(bus: &Bus, envelope: &BusMessage, content: String, tool_calls: Vec<ToolCall>) {
    let mut map = serde_json::Map::new();
    map.insert("content".into(), serde_json::json!(content));
    map.insert(
        "tool_calls".into(),
        if tool_calls.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::to_value(&tool_calls).unwrap()
        },
    );
    let result = BusMessage::new(
        envelope.run_id.clone(),
        envelope.owner_key.clone(),
        Role::Ai,
        MessageContent::Map(map),
    );
    bus.publish(Topic::LlmResults, serde_json::to_value(result).unwrap());
}

fn publish_error(bus: &Bus, envelope: &BusMessage, message: &str) {
    tracing::warn!(error = %message, run_id = %envelope.run_id, "llm service: request failed");
    let mut map = serde_json::Map::new();
    map.insert(
        "content".into(),
        serde_json::json!(format!("Error processing LLM request: {message}")),
    );
    map.insert("tool_calls".into(), serde_json::Value::Null);
    let result = BusMessage::new(
        envelope.run_id.clone(),
        envelope.owner_key.clone(),
        Role::Ai,
        MessageContent::Map(map),
    );
    bus.publish(Topic::LlmResults, serde_json::to_value(result).unwrap());
}

#[cfg(test)]
mod tests {
    use super::*;
    use nx_domain::config::LlmConfig;

    #[tokio::test]
    async fn missing_provider_publishes_terminal_error_result() {
        let bus = Bus::new();
        let seen = Arc::new(tokio::sync::Mutex::new(None));
        let s = seen.clone();
        bus.subscribe(Topic::LlmResults, move |payload| {
            let s = s.clone();
            async move {
                *s.lock().await = Some(payload);
            }
        });
        bus.run_forever();

        let registry = Arc::new(ProviderRegistry::from_config(&LlmConfig::default()).unwrap());
        register(&bus, registry);

        let mut content = serde_json::Map::new();
        content.insert("messages".into(), serde_json::json!([]));
        content.insert("tools".into(), serde_json::json!([]));
        let envelope = BusMessage::new("run_1", "0xabc", Role::System, MessageContent::Map(content));
        bus.publish(Topic::LlmRequests, serde_json::to_value(envelope).unwrap());

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let result = seen.lock().await.clone().expect("expected an llm.results publish");
        let parsed: BusMessage = serde_json::from_value(result).unwrap();
        let map = parsed.content.as_map().unwrap();
        assert!(map["content"].as_str().unwrap().contains("no LLM provider configured"));
    }
}
