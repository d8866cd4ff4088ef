use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use nx_domain::config::Config;
use parking_lot::RwLock;

use crate::record::{EffectiveProfile, IdentityRecord, UserOverrides};

/// Gatekeeper: resolves public keys to stored identity records, creating
/// them on first contact. Backed by one JSON file per identity under
/// `base_dir`; an in-memory cache avoids re-reading on every bus hop.
pub struct IdentityService {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, IdentityRecord>>,
}

impl IdentityService {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, public_key: &str) -> PathBuf {
        self.base_dir.join(format!("{public_key}.json"))
    }

    /// Loads from disk into the cache if not already present. Store errors
    /// surface as "not found" per the gatekeeper's failure semantics.
    fn load_into_cache(&self, public_key: &str) {
        if self.cache.read().contains_key(public_key) {
            return;
        }
        let path = self.path_for(public_key);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return;
        };
        match serde_json::from_str::<IdentityRecord>(&raw) {
            Ok(record) => {
                self.cache.write().insert(public_key.to_string(), record);
            }
            Err(e) => {
                tracing::warn!(public_key, error = %e, "identity record on disk is corrupt");
            }
        }
    }

    fn persist(&self, record: &IdentityRecord) {
        if let Err(e) = std::fs::create_dir_all(&self.base_dir) {
            tracing::warn!(error = %e, "failed to create identity store directory");
            return;
        }
        let path = self.path_for(&record.public_key);
        match serde_json::to_vec_pretty(record) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, bytes) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to persist identity record");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize identity record"),
        }
    }

    pub fn get_identity(&self, public_key: &str) -> Option<IdentityRecord> {
        self.load_into_cache(public_key);
        self.cache.read().get(public_key).cloned()
    }

    /// Returns `true` on successful creation, `false` without raising if a
    /// record already exists or the write fails.
    pub fn create_identity(
        &self,
        public_key: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> bool {
        if self.get_identity(public_key).is_some() {
            return false;
        }
        let record = IdentityRecord::new(public_key, metadata.unwrap_or_default());
        self.persist(&record);
        self.cache
            .write()
            .insert(public_key.to_string(), record.clone());
        true
    }

    /// Returns the record plus whether it was created by this call.
    pub fn get_or_create_identity(&self, public_key: &str) -> (IdentityRecord, bool) {
        if let Some(record) = self.get_identity(public_key) {
            return (record, false);
        }
        self.create_identity(public_key, None);
        let record = self
            .get_identity(public_key)
            .expect("record was just created");
        (record, true)
    }

    pub fn get_effective_profile(&self, public_key: &str, defaults: &Config) -> EffectiveProfile {
        let record = self.get_identity(public_key);
        let config_overrides = record
            .as_ref()
            .map(|r| r.config_overrides.clone())
            .unwrap_or_default();
        let prompt_overrides = record
            .as_ref()
            .map(|r| r.prompt_overrides.clone())
            .unwrap_or_default();

        let mut effective_config = defaults.user_defaults.config.clone();
        for (key, value) in &config_overrides {
            effective_config.insert(key.clone(), value.clone());
        }

        let mut effective_prompts = HashMap::new();
        for (name, default_prompt) in &defaults.user_defaults.prompts {
            let content = prompt_overrides
                .get(name)
                .and_then(|v| v.get("content"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| default_prompt.content.clone());
            effective_prompts.insert(
                name.clone(),
                serde_json::json!({
                    "content": content,
                    "editable": default_prompt.editable,
                    "order": default_prompt.order,
                }),
            );
        }

        EffectiveProfile {
            effective_config,
            effective_prompts,
            user_overrides: UserOverrides {
                config: config_overrides,
                prompts: prompt_overrides,
            },
            editable_fields: defaults.ui.editable_fields.clone(),
            field_options: defaults.ui.field_options.clone(),
        }
    }

    /// Atomic field-level replacement: each key in `overrides` replaces the
    /// corresponding key already stored, leaving untouched keys intact.
    pub fn update_user_config(
        &self,
        public_key: &str,
        overrides: HashMap<String, serde_json::Value>,
    ) {
        let (mut record, _) = self.get_or_create_identity(public_key);
        for (key, value) in overrides {
            record.config_overrides.insert(key, value);
        }
        self.persist(&record);
        self.cache.write().insert(public_key.to_string(), record);
    }

    pub fn update_user_prompts(
        &self,
        public_key: &str,
        overrides: HashMap<String, serde_json::Value>,
    ) {
        let (mut record, _) = self.get_or_create_identity(public_key);
        for (key, value) in overrides {
            record.prompt_overrides.insert(key, value);
        }
        self.persist(&record);
        self.cache.write().insert(public_key.to_string(), record);
    }
}

pub type SharedIdentityService = Arc<IdentityService>;

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (IdentityService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (IdentityService::new(dir.path()), dir)
    }

    #[test]
    fn get_identity_missing_returns_none() {
        let (svc, _dir) = service();
        assert!(svc.get_identity("0xabc").is_none());
    }

    #[test]
    fn create_identity_starts_with_empty_overrides() {
        let (svc, _dir) = service();
        assert!(svc.create_identity("0xabc", None));
        let record = svc.get_identity("0xabc").unwrap();
        assert!(record.config_overrides.is_empty());
        assert!(record.prompt_overrides.is_empty());
    }

    #[test]
    fn create_identity_twice_is_false_second_time() {
        let (svc, _dir) = service();
        assert!(svc.create_identity("0xabc", None));
        assert!(!svc.create_identity("0xabc", None));
    }

    #[test]
    fn get_or_create_is_idempotent_after_first_call() {
        let (svc, _dir) = service();
        let (first, created_first) = svc.get_or_create_identity("0xabc");
        let (second, created_second) = svc.get_or_create_identity("0xabc");
        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.public_key, second.public_key);
    }

    #[test]
    fn update_user_config_is_field_level() {
        let (svc, _dir) = service();
        let mut first = HashMap::new();
        first.insert("a".to_string(), serde_json::json!(1));
        svc.update_user_config("0xabc", first);
        let mut second = HashMap::new();
        second.insert("b".to_string(), serde_json::json!(2));
        svc.update_user_config("0xabc", second);

        let record = svc.get_identity("0xabc").unwrap();
        assert_eq!(record.config_overrides.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(record.config_overrides.get("b"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn effective_profile_merges_overrides_onto_defaults() {
        let (svc, _dir) = service();
        let mut config = Config::default();
        config
            .user_defaults
            .config
            .insert("tone".to_string(), serde_json::json!("neutral"));
        config.user_defaults.prompts.insert(
            "friends_profile".to_string(),
            nx_domain::config::PromptDefault {
                content: "default bio".to_string(),
                editable: true,
                order: 0,
            },
        );

        let mut overrides = HashMap::new();
        overrides.insert("tone".to_string(), serde_json::json!("playful"));
        svc.update_user_config("0xabc", overrides);

        let profile = svc.get_effective_profile("0xabc", &config);
        assert_eq!(
            profile.effective_config.get("tone"),
            Some(&serde_json::json!("playful"))
        );
        let prompt = &profile.effective_prompts["friends_profile"];
        assert_eq!(prompt["content"], serde_json::json!("default bio"));
        assert_eq!(prompt["editable"], serde_json::json!(true));
    }

    #[test]
    fn effective_profile_does_not_leak_across_owners() {
        let (svc, _dir) = service();
        let config = Config::default();
        let mut overrides = HashMap::new();
        overrides.insert("tone".to_string(), serde_json::json!("playful"));
        svc.update_user_config("0xabc", overrides);

        let other_profile = svc.get_effective_profile("0xdef", &config);
        assert!(!other_profile.user_overrides.config.contains_key("tone"));
    }
}
