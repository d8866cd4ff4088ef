//! Context Builder: assembles the five-message prompt (CORE_IDENTITY,
//! CAPABILITIES, SHARED_MEMORY, FRIENDS_INFO, THIS_MOMENT) handed to the LLM
//! Service for each run.

mod builder;
mod service;
mod time;
mod truncation;

pub use builder::{build, ContextInputs, HistoryEntry, HistoryRole};
pub use service::{register, ToolCatalogFn};
