//! Wires the registry to the bus: consumes `tools.requests`, dispatches to
//! the named tool, publishes `tools.results` (spec §4.6).

use std::sync::Arc;

use nx_bus::{Bus, Topic};
use nx_domain::models::{Message, MessageContent, Role};

use crate::registry::ToolRegistry;

pub fn register(bus: &Bus, registry: Arc<ToolRegistry>) {
    let publish_bus = bus.clone();
    bus.subscribe(Topic::ToolsRequests, move |payload| {
        let registry = registry.clone();
        let bus = publish_bus.clone();
        async move {
            let envelope: Message = match serde_json::from_value(payload) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "tool executor: malformed request, dropping");
                    return;
                }
            };
            let response = dispatch(&envelope, &registry).await;
            bus.publish(Topic::ToolsResults, serde_json::to_value(response).unwrap());
        }
    });
}

async fn dispatch(envelope: &Message, registry: &ToolRegistry) -> Message {
    let outcome = match envelope.content.as_map() {
        Some(map) => run_tool(map, registry).await,
        None => Err("tools.requests payload is not a shape with name/args/call_id".to_string()),
    };

    let call_id = envelope
        .content
        .as_map()
        .and_then(|m| m.get("call_id"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let tool_name = envelope
        .content
        .as_map()
        .and_then(|m| m.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let mut content = serde_json::Map::new();
    match outcome {
        Ok(result) => {
            content.insert("status".into(), serde_json::json!("success"));
            content.insert("result".into(), serde_json::json!(result));
        }
        Err(error) => {
            content.insert("status".into(), serde_json::json!("error"));
            content.insert("result".into(), serde_json::json!(error));
        }
    }
    content.insert("tool_name".into(), serde_json::json!(tool_name));
    content.insert("call_id".into(), serde_json::json!(call_id));

    Message::new(
        envelope.run_id.clone(),
        envelope.owner_key.clone(),
        Role::Tool,
        MessageContent::Map(content),
    )
}

async fn run_tool(
    map: &serde_json::Map<String, serde_json::Value>,
    registry: &ToolRegistry,
) -> Result<String, String> {
    let name = map
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "tools.requests payload missing 'name'".to_string())?;
    let args = map.get("args").cloned().unwrap_or(serde_json::Value::Null);

    let tool = registry
        .get(name)
        .ok_or_else(|| format!("Tool '{name}' not found in registry"))?;

    tool.invoke(args).await.map_err(|e| e.to_string())
}
