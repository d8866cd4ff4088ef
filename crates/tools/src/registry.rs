use std::collections::HashMap;
use std::sync::Arc;

use nx_domain::tool::ToolDefinition;
use parking_lot::RwLock;
use serde_json::Value;

/// A single callable tool. Implementations return the tool's textual
/// result directly; failures are surfaced as `Err` and wrapped into a
/// `tools.results` error payload by the caller, never panicked.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn invoke(&self, args: Value) -> anyhow::Result<String>;
}

/// Flat name → tool registry (spec §4.6). Reads are lock-free-ish (a
/// `parking_lot::RwLock`, uncontended in practice since registration only
/// happens at startup).
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Snapshot of every registered tool's definition, in the shape the
    /// Context Builder's `[CAPABILITIES]` section and the LLM request's
    /// `tools` field both need.
    pub fn snapshot(&self) -> Vec<ToolDefinition> {
        self.tools.read().values().map(|t| t.definition()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Stub;

    #[async_trait::async_trait]
    impl Tool for Stub {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "stub".into(),
                description: "test tool".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }
        async fn invoke(&self, _args: Value) -> anyhow::Result<String> {
            Ok("ok".into())
        }
    }

    #[test]
    fn get_missing_returns_none() {
        let registry = ToolRegistry::new();
        assert!(registry.get("stub").is_none());
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Stub));
        assert!(registry.get("stub").is_some());
    }

    #[test]
    fn snapshot_lists_every_registered_tool() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Stub));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "stub");
    }
}
