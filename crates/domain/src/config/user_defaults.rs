use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// user_defaults.config.* / user_defaults.prompts.*
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Identity::get_effective_profile merges these system defaults with a
// user's stored overrides (defaults ⊕ overrides, overrides win per key).

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserDefaultsConfig {
    /// Arbitrary per-user config keys and their system-wide default values.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    /// System prompt defaults, keyed by prompt name.
    #[serde(default)]
    pub prompts: HashMap<String, PromptDefault>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefault {
    pub content: String,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub order: i32,
}
