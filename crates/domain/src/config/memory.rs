use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory: Shared Memory rendering size + background learning task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// How many recent history messages the Context Builder renders into
    /// `[SHARED_MEMORY]`.
    #[serde(default = "d_history_context_size")]
    pub history_context_size: u32,
    #[serde(default)]
    pub learning: LearningConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_context_size: d_history_context_size(),
            learning: LearningConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_threshold_turns")]
    pub threshold_turns: u32,
    /// Which model role drives the out-of-band learning call: "system" uses
    /// the operator's configured model, "user" uses the owner's preference.
    #[serde(default = "d_llm_model")]
    pub llm_model: String,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_turns: d_threshold_turns(),
            llm_model: d_llm_model(),
        }
    }
}

fn d_history_context_size() -> u32 {
    20
}
fn d_true() -> bool {
    true
}
fn d_threshold_turns() -> u32 {
    20
}
fn d_llm_model() -> String {
    "system".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let m = MemoryConfig::default();
        assert_eq!(m.history_context_size, 20);
        assert!(m.learning.enabled);
        assert_eq!(m.learning.threshold_turns, 20);
        assert_eq!(m.learning.llm_model, "system");
    }
}
