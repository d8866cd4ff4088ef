//! The closed topic catalog. Nothing outside this list is a valid publish
//! target — keeping it as an enum instead of a bare `&str` lets typos fail
//! to compile rather than fail silently at runtime.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RunsNew,
    ContextBuildRequest,
    ContextBuildResponse,
    LlmRequests,
    LlmResults,
    ToolsRequests,
    ToolsResults,
    UiEvents,
    SystemCommand,
    CommandResult,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunsNew => "runs.new",
            Self::ContextBuildRequest => "context.build.request",
            Self::ContextBuildResponse => "context.build.response",
            Self::LlmRequests => "llm.requests",
            Self::LlmResults => "llm.results",
            Self::ToolsRequests => "tools.requests",
            Self::ToolsResults => "tools.results",
            Self::UiEvents => "ui.events",
            Self::SystemCommand => "system.command",
            Self::CommandResult => "command.result",
        }
    }

    pub fn all() -> [Topic; 10] {
        [
            Self::RunsNew,
            Self::ContextBuildRequest,
            Self::ContextBuildResponse,
            Self::LlmRequests,
            Self::LlmResults,
            Self::ToolsRequests,
            Self::ToolsResults,
            Self::UiEvents,
            Self::SystemCommand,
            Self::CommandResult,
        ]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_matches_catalog_names() {
        assert_eq!(Topic::RunsNew.as_str(), "runs.new");
        assert_eq!(Topic::ContextBuildRequest.as_str(), "context.build.request");
        assert_eq!(Topic::CommandResult.as_str(), "command.result");
    }

    #[test]
    fn all_has_ten_entries() {
        assert_eq!(Topic::all().len(), 10);
    }
}
