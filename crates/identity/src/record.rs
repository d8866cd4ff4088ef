use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored identity, one per public key. Overrides start empty and are
/// only ever populated through the authenticated REST update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub config_overrides: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub prompt_overrides: HashMap<String, serde_json::Value>,
}

impl IdentityRecord {
    pub fn new(public_key: impl Into<String>, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            public_key: public_key.into(),
            created_at: Utc::now(),
            metadata,
            config_overrides: HashMap::new(),
            prompt_overrides: HashMap::new(),
        }
    }
}

/// The merged view handed to the Context Builder and to `GET /config`/`/prompts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveProfile {
    pub effective_config: HashMap<String, serde_json::Value>,
    pub effective_prompts: HashMap<String, serde_json::Value>,
    pub user_overrides: UserOverrides,
    pub editable_fields: Vec<String>,
    pub field_options: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverrides {
    pub config: HashMap<String, serde_json::Value>,
    pub prompts: HashMap<String, serde_json::Value>,
}
