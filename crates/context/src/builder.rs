use chrono::{DateTime, Utc};
use nx_domain::tool::{Message, ToolDefinition};

use crate::time::derive_local_time;
use crate::truncation::truncate_shared_memory;

const CORE_IDENTITY: &str = "\
You are Nexus, a conversational AI orchestrator. The context below is \
organized into tagged sections — [CAPABILITIES], [SHARED_MEMORY], \
[FRIENDS_INFO], and [THIS_MOMENT] — that ground your reply in the tools \
available to you, recent conversation history, the person you're speaking \
with, and the current moment. Always match the human's language.";

/// One prior conversation turn, already filtered down to HUMAN/AI roles and
/// ordered chronologically (oldest first) by the caller.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub role: HistoryRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    Human,
    Ai,
}

impl HistoryRole {
    fn label(self) -> &'static str {
        match self {
            Self::Human => "Human",
            Self::Ai => "Nexus",
        }
    }
}

/// The inputs needed to assemble the five-message prompt, already resolved
/// by the service layer (history fetched, tools snapshotted, profile and
/// clock fields pulled from the run).
pub struct ContextInputs<'a> {
    pub history: &'a [HistoryEntry],
    pub tools: &'a [ToolDefinition],
    pub friends_profile: Option<&'a str>,
    pub member_since: Option<&'a str>,
    pub client_timestamp_utc: Option<DateTime<Utc>>,
    pub client_timezone_offset: i64,
    pub human_input: &'a str,
}

/// Builds the exact five-message sequence (spec §4.4) consumed by the LLM.
pub fn build(inputs: &ContextInputs<'_>) -> Vec<Message> {
    vec![
        Message::system(CORE_IDENTITY),
        Message::user(render_capabilities(inputs.tools)),
        Message::user(render_shared_memory(inputs.history)),
        Message::user(render_friends_info(inputs.friends_profile, inputs.member_since)),
        Message::user(render_this_moment(
            inputs.client_timestamp_utc,
            inputs.client_timezone_offset,
            inputs.human_input,
        )),
    ]
}

fn render_capabilities(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return "[CAPABILITIES]\nNo tools available.".to_string();
    }
    let mut body = String::new();
    for tool in tools {
        body.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        let properties = tool
            .parameters
            .get("properties")
            .and_then(|v| v.as_object());
        let required: Vec<&str> = tool
            .parameters
            .get("required")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        if let Some(properties) = properties {
            for (param_name, schema) in properties {
                let annotation = if required.contains(&param_name.as_str()) {
                    "required"
                } else {
                    "optional"
                };
                let ty = schema.get("type").and_then(|v| v.as_str()).unwrap_or("any");
                body.push_str(&format!("    {param_name} ({annotation}, {ty})\n"));
            }
        }
    }
    format!("[CAPABILITIES]\n{}", body.trim_end())
}

fn render_shared_memory(history: &[HistoryEntry]) -> String {
    let count = history.len();
    let header = format!("[SHARED_MEMORY count={count}]\nRecent conversation memory:\n\n");
    if history.is_empty() {
        return format!("{header}(No previous conversations yet)");
    }
    let mut body = String::new();
    for entry in history {
        let content = truncate_shared_memory(&entry.content);
        body.push_str(&format!(
            "[{}] {}: {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.role.label(),
            content
        ));
    }
    format!("{header}{}", body.trim_end())
}

fn render_friends_info(friends_profile: Option<&str>, member_since: Option<&str>) -> String {
    let header = "[FRIENDS_INFO]\nAbout this friend:\n\n";
    let body = match (friends_profile, member_since) {
        (Some(profile), _) if !profile.is_empty() => profile.to_string(),
        (_, Some(since)) => format!("Member since: {since}"),
        _ => "(Still learning about this friend's preferences)".to_string(),
    };
    format!("{header}{body}")
}

fn render_this_moment(
    client_timestamp_utc: Option<DateTime<Utc>>,
    client_timezone_offset: i64,
    human_input: &str,
) -> String {
    let current_time_line = client_timestamp_utc
        .map(|ts| {
            format!(
                "<current_time>{}</current_time>\n",
                derive_local_time(ts, client_timezone_offset)
            )
        })
        .unwrap_or_default();
    format!("[THIS_MOMENT]\n{current_time_line}<human_input>\n{human_input}\n</human_input>")
}
