//! The bus's canonical data model: `Message`, `Run`, and their enums.
//!
//! Distinct from [`crate::tool::Message`], which is the LLM-wire message
//! shape exchanged with providers. These types are the bus payload and
//! the persisted/run-tracking record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolDefinition;

/// Generate a new message id, prefixed `msg_`.
pub fn new_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Generate a new run id, prefixed `run_`.
pub fn new_run_id() -> String {
    format!("run_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Human,
    Ai,
    System,
    Tool,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    BuildingContext,
    AwaitingLlmDecision,
    AwaitingToolResult,
    GeneratingResponse,
    Completed,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// `Message.content` is polymorphic: a plain string, a structured map, or a
/// nested `Run` (used when a message itself carries the run that spawned it,
/// e.g. `runs.new`/`context.build.request` payloads).
///
/// `Run` is listed before `Map` so serde's untagged probing tries it first:
/// a `Run`'s required fields (`id`, `status`, `history`, ...) never appear on
/// the ad-hoc maps other topics carry, so this ordering is unambiguous in
/// practice, but the reverse ordering would silently swallow every `Run`
/// payload into the `Map` variant instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Run(Box<Run>),
    Map(serde_json::Map<String, serde_json::Value>),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_run(&self) -> Option<&Run> {
        match self {
            Self::Run(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Map(m) => m.is_empty(),
            Self::Run(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub run_id: String,
    pub owner_key: String,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(
        run_id: impl Into<String>,
        owner_key: impl Into<String>,
        role: Role,
        content: MessageContent,
    ) -> Self {
        Self {
            id: new_message_id(),
            run_id: run_id.into(),
            owner_key: owner_key.into(),
            role,
            content,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub owner_key: String,
    pub status: RunStatus,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Run {
    pub fn new(owner_key: impl Into<String>) -> Self {
        Self {
            id: new_run_id(),
            owner_key: owner_key.into(),
            status: RunStatus::Pending,
            history: Vec::new(),
            iteration_count: 0,
            tools: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// The first HUMAN message in history, if any — the run's originating utterance.
    pub fn first_human_message(&self) -> Option<&Message> {
        self.history.iter().find(|m| m.role == Role::Human)
    }

    pub fn pending_tool_calls(&self) -> u32 {
        self.metadata
            .get("pending_tool_calls")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    pub fn set_pending_tool_calls(&mut self, n: u32) {
        self.metadata
            .insert("pending_tool_calls".into(), serde_json::json!(n));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_has_prefix() {
        assert!(new_message_id().starts_with("msg_"));
    }

    #[test]
    fn run_id_has_prefix() {
        assert!(new_run_id().starts_with("run_"));
    }

    #[test]
    fn run_starts_pending_and_empty() {
        let run = Run::new("0xabc");
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.history.is_empty());
        assert_eq!(run.iteration_count, 0);
        assert!(!run.status.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::TimedOut.is_terminal());
        assert!(!RunStatus::AwaitingToolResult.is_terminal());
    }

    #[test]
    fn first_human_message_finds_earliest_human() {
        let mut run = Run::new("0xabc");
        run.history.push(Message::new(
            run.id.clone(),
            "0xabc",
            Role::System,
            MessageContent::Text("sys".into()),
        ));
        run.history.push(Message::new(
            run.id.clone(),
            "0xabc",
            Role::Human,
            MessageContent::Text("hello".into()),
        ));
        let human = run.first_human_message().unwrap();
        assert_eq!(human.content.as_text(), Some("hello"));
    }

    #[test]
    fn pending_tool_calls_roundtrip() {
        let mut run = Run::new("0xabc");
        assert_eq!(run.pending_tool_calls(), 0);
        run.set_pending_tool_calls(2);
        assert_eq!(run.pending_tool_calls(), 2);
    }

    #[test]
    fn message_content_role_serde_roundtrip() {
        let role = Role::Human;
        let json = serde_json::to_string(&role).unwrap();
        assert_eq!(json, "\"HUMAN\"");
    }

    #[test]
    fn run_variant_is_not_swallowed_by_map_variant() {
        let run = Run::new("0xabc");
        let value = serde_json::to_value(&run).unwrap();
        let content: MessageContent = serde_json::from_value(value).unwrap();
        assert!(content.as_run().is_some(), "Run payload must deserialize as Run, not Map");
    }

    #[test]
    fn content_map_variant() {
        let mut map = serde_json::Map::new();
        map.insert("chunk".into(), serde_json::json!("hi"));
        let content = MessageContent::Map(map);
        assert!(content.as_map().is_some());
        assert!(content.as_text().is_none());
    }
}
