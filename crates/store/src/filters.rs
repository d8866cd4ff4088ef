//! Pure per-topic filtering rules (spec §4.3), kept separate from the bus
//! wiring so they're trivially unit-testable without a running bus.

use nx_domain::models::{Message, MessageContent, Role};

/// `context.build.request` carries a `Run` in its content; only the first
/// HUMAN message of that run is ever persisted from this topic — this is
/// the one point at which Persistence sees the human's raw utterance,
/// because only validated members' runs reach context-building at all.
pub fn filter_context_build_request(envelope: &Message) -> Option<Message> {
    let run = envelope.content.as_run()?;
    run.first_human_message().cloned()
}

/// `llm.results` carries both streaming passthroughs (role SYSTEM) and the
/// final AI decision (role AI, content `{content, tool_calls}`).
pub fn filter_llm_results(envelope: &Message) -> Option<Message> {
    if envelope.role == Role::System {
        return None;
    }
    let map = envelope.content.as_map()?;
    let content_text = map
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let tool_calls = map.get("tool_calls").cloned().unwrap_or(serde_json::Value::Null);
    let has_tool_calls = matches!(&tool_calls, serde_json::Value::Array(a) if !a.is_empty());

    if content_text.is_empty() && !has_tool_calls {
        return None;
    }

    let mut metadata = envelope.metadata.clone();
    metadata.insert("tool_calls".into(), tool_calls);
    metadata.insert("has_tool_calls".into(), serde_json::json!(has_tool_calls));

    Some(
        Message::new(
            envelope.run_id.clone(),
            envelope.owner_key.clone(),
            Role::Ai,
            MessageContent::Text(content_text),
        )
        .with_metadata(metadata),
    )
}

/// `tools.results` carries `{status, result, tool_name, call_id}`.
pub fn filter_tools_results(envelope: &Message) -> Option<Message> {
    let map = envelope.content.as_map()?;
    let result = map.get("result").and_then(|v| v.as_str()).unwrap_or("");
    if result.is_empty() {
        return None;
    }
    let status = map
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("error")
        .to_string();
    let tool_name = map
        .get("tool_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let call_id = map
        .get("call_id")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut metadata = envelope.metadata.clone();
    metadata.insert("tool_name".into(), serde_json::json!(tool_name));
    metadata.insert("status".into(), serde_json::json!(status.clone()));
    metadata.insert(
        "execution_success".into(),
        serde_json::json!(status == "success"),
    );
    metadata.insert("call_id".into(), serde_json::json!(call_id));

    Some(
        Message::new(
            envelope.run_id.clone(),
            envelope.owner_key.clone(),
            Role::Tool,
            MessageContent::Text(result.to_string()),
        )
        .with_metadata(metadata),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nx_domain::models::Run;

    fn run_with_human(owner: &str, text: &str) -> Run {
        let mut run = Run::new(owner);
        run.history.push(Message::new(
            run.id.clone(),
            owner,
            Role::Human,
            MessageContent::Text(text.into()),
        ));
        run
    }

    #[test]
    fn context_build_request_extracts_first_human_message() {
        let run = run_with_human("0xabc", "hello");
        let envelope = Message::new(
            run.id.clone(),
            run.owner_key.clone(),
            Role::System,
            MessageContent::Run(Box::new(run)),
        );
        let persisted = filter_context_build_request(&envelope).unwrap();
        assert_eq!(persisted.role, Role::Human);
        assert_eq!(persisted.content.as_text(), Some("hello"));
    }

    #[test]
    fn llm_results_skips_system_role() {
        let envelope = Message::new(
            "run_1",
            "0xabc",
            Role::System,
            MessageContent::Map(serde_json::Map::new()),
        );
        assert!(filter_llm_results(&envelope).is_none());
    }

    #[test]
    fn llm_results_skips_empty_content_with_no_tool_calls() {
        let mut map = serde_json::Map::new();
        map.insert("content".into(), serde_json::json!(""));
        let envelope = Message::new("run_1", "0xabc", Role::Ai, MessageContent::Map(map));
        assert!(filter_llm_results(&envelope).is_none());
    }

    #[test]
    fn llm_results_persists_with_tool_calls_metadata() {
        let mut map = serde_json::Map::new();
        map.insert("content".into(), serde_json::json!("sunny"));
        map.insert(
            "tool_calls".into(),
            serde_json::json!([{"id": "c1", "function": {"name": "web_search"}}]),
        );
        let envelope = Message::new("run_1", "0xabc", Role::Ai, MessageContent::Map(map));
        let persisted = filter_llm_results(&envelope).unwrap();
        assert_eq!(persisted.role, Role::Ai);
        assert_eq!(persisted.metadata["has_tool_calls"], serde_json::json!(true));
    }

    #[test]
    fn llm_results_nil_content_with_tool_calls_persists_empty_string() {
        let mut map = serde_json::Map::new();
        map.insert(
            "tool_calls".into(),
            serde_json::json!([{"id": "c1"}]),
        );
        let envelope = Message::new("run_1", "0xabc", Role::Ai, MessageContent::Map(map));
        let persisted = filter_llm_results(&envelope).unwrap();
        assert_eq!(persisted.content.as_text(), Some(""));
    }

    #[test]
    fn tools_results_skips_empty_result() {
        let mut map = serde_json::Map::new();
        map.insert("result".into(), serde_json::json!(""));
        let envelope = Message::new("run_1", "0xabc", Role::Tool, MessageContent::Map(map));
        assert!(filter_tools_results(&envelope).is_none());
    }

    #[test]
    fn tools_results_persists_with_metadata() {
        let mut map = serde_json::Map::new();
        map.insert("result".into(), serde_json::json!("It's sunny"));
        map.insert("status".into(), serde_json::json!("success"));
        map.insert("tool_name".into(), serde_json::json!("web_search"));
        map.insert("call_id".into(), serde_json::json!("c1"));
        let envelope = Message::new("run_1", "0xabc", Role::Tool, MessageContent::Map(map));
        let persisted = filter_tools_results(&envelope).unwrap();
        assert_eq!(persisted.role, Role::Tool);
        assert_eq!(
            persisted.metadata["execution_success"],
            serde_json::json!(true)
        );
    }
}
