use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Keys: `llm.providers.<id>.{api_key,base_url,model}` and
// `llm.catalog.<model_name>.{provider,id}`. A catalog entry is a friendly
// name resolving to a provider id plus that provider's model id, so the
// Orchestrator/LLM Service can be configured with "gpt-4o" instead of
// repeating provider wiring per call site.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_20000u")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Abort startup when no providers initialize.
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
    /// Registered LLM providers, keyed by provider id.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Friendly model name -> (provider id, provider-side model id).
    #[serde(default)]
    pub catalog: HashMap<String, CatalogEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            max_retries: 2,
            startup_policy: LlmStartupPolicy::AllowNone,
            providers: HashMap::new(),
            catalog: HashMap::new(),
        }
    }
}

/// Controls how the gateway handles LLM provider initialization at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    /// Gateway boots even if no LLM providers initialize; LLM endpoints
    /// surface a Provider error until credentials are configured.
    #[default]
    AllowNone,
    /// Abort startup if no LLM providers successfully initialize.
    RequireOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub provider: String,
    pub id: String,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_20000u() -> u64 {
    20_000
}
fn d_2() -> u32 {
    2
}
