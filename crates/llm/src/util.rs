//! Shared utility functions for provider adapters.

use nx_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key for a configured provider.
///
/// Precedence:
/// 1. `api_key` field in config (plaintext)
/// 2. OS keychain, service `"nexus"`, account `provider_id`
/// 3. Error
pub fn resolve_api_key(provider_id: &str, api_key: &Option<String>) -> Result<String> {
    if let Some(key) = api_key {
        return Ok(key.clone());
    }

    match resolve_from_keychain("nexus", provider_id) {
        Ok(secret) => Ok(secret),
        Err(e) => {
            tracing::warn!(
                provider_id,
                error = %e,
                "no api_key configured and keychain lookup failed"
            );
            Err(Error::Auth(format!(
                "no API key configured for provider '{provider_id}': set \
                 llm.providers.{provider_id}.api_key or store it in the OS keychain"
            )))
        }
    }
}

/// Try to read a secret from the OS keychain.
///
/// Uses the `keyring` crate which wraps platform-native credential stores.
/// Returns an error on headless systems where no keychain daemon is available.
pub fn resolve_from_keychain(service: &str, account: &str) -> Result<String> {
    let entry = keyring::Entry::new(service, account)
        .map_err(|e| Error::Auth(format!("keyring entry creation failed: {e}")))?;
    entry
        .get_password()
        .map_err(|e| Error::Auth(format!("keyring get_password failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_plaintext() {
        let result = resolve_api_key("openai", &Some("sk-test-123".into())).unwrap();
        assert_eq!(result, "sk-test-123");
    }

    #[test]
    fn resolve_api_key_missing_errors() {
        let err = resolve_api_key("no-such-provider-xyz", &None).unwrap_err();
        assert!(err.to_string().contains("no-such-provider-xyz"));
    }
}
