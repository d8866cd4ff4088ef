//! Background memory-learning task: every `threshold_turns` turns for an
//! owner, asks the LLM to distill the recent conversation into a short
//! profile and writes it back as a prompt override. Runs entirely outside
//! the bus's closed topic catalog — it listens to `context.build.request`
//! only to count turns, and talks to identity/LLM directly rather than
//! publishing new bus topics.

use std::collections::HashMap;
use std::sync::Arc;

use nx_bus::{Bus, Topic};
use nx_domain::config::Config;
use nx_domain::tool::Message as LlmMessage;
use nx_identity::IdentityService;
use nx_llm::{ChatRequest, ProviderRegistry};
use nx_store::MessageStore;
use parking_lot::Mutex;

const FRIENDS_PROFILE_KEY: &str = "friends_profile";

/// Subscribes the turn counter if `memory.learning.enabled`; a no-op
/// otherwise.
pub fn register(bus: &Bus, identity: Arc<IdentityService>, store: Arc<MessageStore>, llm: Arc<ProviderRegistry>, config: Arc<Config>) {
    if !config.memory.learning.enabled {
        tracing::info!("memory learning disabled (memory.learning.enabled = false)");
        return;
    }

    let turns: Arc<Mutex<HashMap<String, u32>>> = Arc::new(Mutex::new(HashMap::new()));
    let threshold = config.memory.learning.threshold_turns.max(1);

    bus.subscribe(Topic::ContextBuildRequest, move |payload| {
        let identity = identity.clone();
        let store = store.clone();
        let llm = llm.clone();
        let config = config.clone();
        let turns = turns.clone();
        async move {
            let Ok(envelope) = serde_json::from_value::<nx_domain::models::Message>(payload) else {
                return;
            };
            let owner_key = envelope.owner_key;

            let due = {
                let mut turns = turns.lock();
                let count = turns.entry(owner_key.clone()).or_insert(0);
                *count += 1;
                if *count >= threshold {
                    *count = 0;
                    true
                } else {
                    false
                }
            };
            if !due {
                return;
            }

            run_learning_pass(&owner_key, &identity, &store, &llm, &config).await;
        }
    });

    tracing::info!(threshold_turns = threshold, "memory learning enabled");
}

async fn run_learning_pass(owner_key: &str, identity: &IdentityService, store: &MessageStore, llm: &ProviderRegistry, config: &Config) {
    let history = store.get_history(owner_key, config.memory.history_context_size as usize);
    if history.is_empty() {
        return;
    }

    let provider = select_provider(owner_key, identity, llm, config);
    let Some(provider) = provider else {
        tracing::debug!(owner_key, "memory learning: no LLM provider available, skipping pass");
        return;
    };

    let transcript: String = history
        .iter()
        .filter_map(|m| m.content.as_text().map(|text| format!("{:?}: {text}", m.role)))
        .collect::<Vec<_>>()
        .join("\n");
    if transcript.is_empty() {
        return;
    }

    let request = ChatRequest {
        messages: vec![
            LlmMessage::system(
                "Summarize what this person has shared about themselves in the conversation below into a short third-person profile, two or three sentences. Respond with the profile text only.",
            ),
            LlmMessage::user(transcript),
        ],
        tools: Vec::new(),
        temperature: None,
        max_tokens: None,
        model: None,
        stream: false,
    };

    match provider.chat(request).await {
        Ok(response) if !response.content.trim().is_empty() => {
            let mut overrides = HashMap::new();
            overrides.insert(FRIENDS_PROFILE_KEY.to_string(), serde_json::json!(response.content.trim()));
            identity.update_user_prompts(owner_key, overrides);
            tracing::info!(owner_key, "memory learning: updated friends_profile");
        }
        Ok(_) => tracing::debug!(owner_key, "memory learning: empty completion, leaving friends_profile unchanged"),
        Err(e) => tracing::warn!(owner_key, error = %e, "memory learning: chat completion failed"),
    }
}

fn select_provider(owner_key: &str, identity: &IdentityService, llm: &ProviderRegistry, config: &Config) -> Option<Arc<dyn nx_llm::LlmProvider>> {
    let first_alphabetical = || llm.list_providers().into_iter().next().and_then(|id| llm.get(&id));

    if config.memory.learning.llm_model == "user" {
        let profile = identity.get_effective_profile(owner_key, config);
        let preferred = profile.effective_config.get("model").and_then(|v| v.as_str()).and_then(|name| llm.for_model(name));
        preferred.or_else(first_alphabetical)
    } else {
        first_alphabetical()
    }
}
