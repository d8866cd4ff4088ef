//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances, plus the
//! friendly-name catalog (spec config key `llm.catalog.<model_name>`) that
//! maps a model name to a provider id and that provider's model id.

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use nx_domain::config::{LlmConfig, LlmStartupPolicy};
use nx_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    catalog: HashMap<String, (String, String)>,
    init_errors: Vec<ProviderInitError>,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub error: String,
}

/// Mask substrings that look like API keys before logging.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors: Vec<ProviderInitError> = Vec::new();

        for (id, pc) in &config.providers {
            match OpenAiCompatProvider::from_config(id, pc) {
                Ok(p) => {
                    tracing::info!(provider_id = %id, "registered LLM provider");
                    providers.insert(id.clone(), Arc::new(p));
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %id,
                        error = %safe_error,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: id.clone(),
                        error: safe_error,
                    });
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            match config.startup_policy {
                LlmStartupPolicy::RequireOne => {
                    return Err(Error::Config(
                        "all configured LLM providers failed to initialize \
                         (startup_policy = require_one)"
                            .into(),
                    ));
                }
                LlmStartupPolicy::AllowNone => {
                    tracing::warn!(
                        failed_providers = init_errors.len(),
                        "no LLM providers initialized (startup_policy = allow_none); \
                         gateway will boot but LLM requests will fail until \
                         credentials are configured"
                    );
                }
            }
        }

        let catalog = config
            .catalog
            .iter()
            .map(|(name, entry)| (name.clone(), (entry.provider.clone(), entry.id.clone())))
            .collect();

        Ok(Self {
            providers,
            catalog,
            init_errors,
        })
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a catalog model name to `(provider, model_id)`.
    pub fn resolve_catalog(&self, model_name: &str) -> Option<(&str, &str)> {
        self.catalog
            .get(model_name)
            .map(|(p, m)| (p.as_str(), m.as_str()))
    }

    /// Get the provider for a catalog model name.
    pub fn for_model(&self, model_name: &str) -> Option<Arc<dyn LlmProvider>> {
        let (provider_id, _) = self.resolve_catalog(model_name)?;
        self.get(provider_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn LlmProvider>)> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Provider initialization errors (empty if all succeeded).
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_empty_registry() {
        let config = LlmConfig::default();
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
        assert!(registry.init_errors().is_empty());
    }

    #[test]
    fn mask_secrets_redacts_long_tokens() {
        let msg = "auth failed for key sk-ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789"));
    }
}
