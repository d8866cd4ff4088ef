use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ui.editable_fields / ui.field_options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UiConfig {
    /// Which `user_defaults.config` / `user_defaults.prompts` keys a client
    /// is allowed to edit via `POST /config` / `POST /prompts`.
    #[serde(default)]
    pub editable_fields: Vec<String>,
    /// Enumerated option lists for fields that are pick-one-of-N.
    #[serde(default)]
    pub field_options: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        let ui = UiConfig::default();
        assert!(ui.editable_fields.is_empty());
        assert!(ui.field_options.is_empty());
    }
}
