//! Persistence: durably records the conversational audit trail for
//! validated members and serves bounded history reads.

mod filters;
mod store;

pub use store::MessageStore;

use std::sync::Arc;

use nx_bus::{Bus, Topic};
use nx_domain::models::Message;

/// Subscribes the three Persistence topics to `store`. Deserialization or
/// filter-rule misses are silently dropped; Persistence never raises to the
/// bus.
pub fn register(bus: &Bus, store: Arc<MessageStore>) {
    let s = store.clone();
    bus.subscribe(Topic::ContextBuildRequest, move |payload| {
        let s = s.clone();
        async move {
            if let Some(envelope) = parse(payload) {
                if let Some(message) = filters::filter_context_build_request(&envelope) {
                    s.persist(message);
                }
            }
        }
    });

    let s = store.clone();
    bus.subscribe(Topic::LlmResults, move |payload| {
        let s = s.clone();
        async move {
            if let Some(envelope) = parse(payload) {
                if let Some(message) = filters::filter_llm_results(&envelope) {
                    s.persist(message);
                }
            }
        }
    });

    let s = store;
    bus.subscribe(Topic::ToolsResults, move |payload| {
        let s = s.clone();
        async move {
            if let Some(envelope) = parse(payload) {
                if let Some(message) = filters::filter_tools_results(&envelope) {
                    s.persist(message);
                }
            }
        }
    });
}

fn parse(payload: serde_json::Value) -> Option<Message> {
    match serde_json::from_value(payload) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "persistence: malformed bus payload, dropping");
            None
        }
    }
}
