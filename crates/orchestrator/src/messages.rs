//! Conversions between the bus's `Message`/`Run` model and the LLM-wire
//! `tool::Message` shape carried on `llm.requests`.

use nx_domain::tool::{ContentPart, Message as ToolMessage, MessageContent as ToolContent, Role as ToolRole, ToolCall};

/// Appends one assistant message carrying the model's tool calls, in the
/// shape a subsequent `llm.requests` expects.
pub fn append_tool_calls_message(messages: &mut Vec<ToolMessage>, tool_calls: &[ToolCall]) {
    let parts = tool_calls
        .iter()
        .map(|call| ContentPart::ToolUse {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            input: call.arguments.clone(),
        })
        .collect();
    messages.push(ToolMessage {
        role: ToolRole::Assistant,
        content: ToolContent::Parts(parts),
    });
}

/// Appends one tool-result message for a single completed call.
pub fn append_tool_result_message(messages: &mut Vec<ToolMessage>, call_id: &str, result: &str) {
    messages.push(ToolMessage::tool_result(call_id, result));
}
