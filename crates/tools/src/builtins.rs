use chrono::Utc;
use nx_domain::tool::ToolDefinition;
use serde_json::Value;

use crate::registry::Tool;

/// Echoes back its `message` argument. Exists to exercise the tool-call
/// round trip end to end without any external dependency.
pub struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "Echoes back the given message.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"}
                },
                "required": ["message"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> anyhow::Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("echo: missing required argument 'message'"))?;
        Ok(message.to_string())
    }
}

/// Returns the current UTC time. No arguments.
pub struct ClockTool;

#[async_trait::async_trait]
impl Tool for ClockTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "clock".into(),
            description: "Returns the current UTC time in RFC 3339 format.".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn invoke(&self, _args: Value) -> anyhow::Result<String> {
        Ok(Utc::now().to_rfc3339())
    }
}
