//! Orchestrator: the state machine owning every live run (spec §4.7).
//! Subscribes to `runs.new`, `context.build.response`, `llm.results`, and
//! `tools.results`; drives each run through context-building, the LLM
//! decision, and the multi-tool barrier until it reaches a terminal state.

mod messages;
mod orchestrator;
mod state;

pub use orchestrator::register;
pub use state::ActiveRuns;
