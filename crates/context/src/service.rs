//! Wires the five-message builder to the bus: consumes `context.build.request`,
//! fetches history and the effective profile, and publishes
//! `context.build.response`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nx_bus::{Bus, Topic};
use nx_domain::models::{Message as BusMessage, MessageContent, Role};
use nx_domain::tool::ToolDefinition;
use nx_identity::IdentityService;
use nx_store::MessageStore;

use crate::builder::{self, ContextInputs, HistoryEntry, HistoryRole};

/// Snapshot of the currently-registered tool catalog, supplied by whatever
/// owns the tool registry (kept as a closure so this crate doesn't need a
/// compile-time dependency on the tool-executor crate).
pub type ToolCatalogFn = Arc<dyn Fn() -> Vec<ToolDefinition> + Send + Sync>;

pub fn register(
    bus: &Bus,
    identity: Arc<IdentityService>,
    store: Arc<MessageStore>,
    tool_catalog: ToolCatalogFn,
    history_context_size: usize,
) {
    let publish_bus = bus.clone();
    bus.subscribe(Topic::ContextBuildRequest, move |payload| {
        let identity = identity.clone();
        let store = store.clone();
        let tool_catalog = tool_catalog.clone();
        let bus = publish_bus.clone();
        async move {
            let envelope: BusMessage = match serde_json::from_value(payload) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "context builder: malformed request, dropping");
                    return;
                }
            };
            let response = match build_response(&envelope, &identity, &store, &tool_catalog, history_context_size) {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, "context builder: failed to assemble context");
                    error_response(&envelope)
                }
            };
            bus.publish(Topic::ContextBuildResponse, serde_json::to_value(response).unwrap());
        }
    });
}

fn build_response(
    envelope: &BusMessage,
    identity: &IdentityService,
    store: &MessageStore,
    tool_catalog: &ToolCatalogFn,
    history_context_size: usize,
) -> anyhow::Result<BusMessage> {
    let run = envelope
        .content
        .as_run()
        .ok_or_else(|| anyhow::anyhow!("context.build.request payload carries no run"))?;

    let human_input = run
        .first_human_message()
        .and_then(|m| m.content.as_text())
        .unwrap_or("")
        .to_string();

    let history: Vec<HistoryEntry> = store
        .get_history(&run.owner_key, history_context_size)
        .into_iter()
        .filter(|m| m.run_id != run.id)
        .filter_map(to_history_entry)
        .collect();
    let mut history = history;
    history.reverse();

    let (record, _) = identity.get_or_create_identity(&run.owner_key);
    let friends_profile = record
        .prompt_overrides
        .get("friends_profile")
        .or_else(|| record.prompt_overrides.get("learning"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let member_since = record.created_at.format("%Y-%m-%d").to_string();

    let client_timestamp_utc: Option<DateTime<Utc>> = run
        .metadata
        .get("client_timestamp_utc")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let client_timezone_offset = run
        .metadata
        .get("client_timezone_offset")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let tools = tool_catalog();

    let inputs = ContextInputs {
        history: &history,
        tools: &tools,
        friends_profile: friends_profile.as_deref(),
        member_since: Some(member_since.as_str()),
        client_timestamp_utc,
        client_timezone_offset,
        human_input: &human_input,
    };
    let messages = builder::build(&inputs);

    let mut content = serde_json::Map::new();
    content.insert("status".into(), serde_json::json!("success"));
    content.insert("messages".into(), serde_json::to_value(&messages)?);
    content.insert("tools".into(), serde_json::to_value(&tools)?);

    Ok(BusMessage::new(
        run.id.clone(),
        run.owner_key.clone(),
        Role::System,
        MessageContent::Map(content),
    ))
}

fn error_response(envelope: &BusMessage) -> BusMessage {
    let (run_id, owner_key) = match envelope.content.as_run() {
        Some(run) => (run.id.clone(), run.owner_key.clone()),
        None => (envelope.run_id.clone(), envelope.owner_key.clone()),
    };
    let mut content = serde_json::Map::new();
    content.insert("status".into(), serde_json::json!("error"));
    content.insert("messages".into(), serde_json::json!([]));
    content.insert("tools".into(), serde_json::json!([]));
    BusMessage::new(run_id, owner_key, Role::System, MessageContent::Map(content))
}

fn to_history_entry(message: BusMessage) -> Option<HistoryEntry> {
    let role = match message.role {
        Role::Human => HistoryRole::Human,
        Role::Ai => HistoryRole::Ai,
        _ => return None,
    };
    let content = message.content.as_text()?.to_string();
    Some(HistoryEntry {
        timestamp: message.timestamp,
        role,
        content,
    })
}
