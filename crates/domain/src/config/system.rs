use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// System: orchestrator-wide safety limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Tool-call iteration cap. A run that would start a new tool-call round
    /// at or beyond this count transitions to `TimedOut` instead.
    #[serde(default = "d_max_tool_iterations")]
    pub max_tool_iterations: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: d_max_tool_iterations(),
        }
    }
}

fn d_max_tool_iterations() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_tool_iterations_is_five() {
        assert_eq!(SystemConfig::default().max_tool_iterations, 5);
    }
}
