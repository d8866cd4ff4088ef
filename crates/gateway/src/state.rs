use std::sync::Arc;

use nx_bus::Bus;
use nx_domain::config::Config;
use nx_identity::IdentityService;
use nx_orchestrator::ActiveRuns;
use nx_store::MessageStore;

use crate::queues::{OwnerQueues, RunQueues};

/// Shared application state handed to every API handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub bus: Bus,
    pub identity: Arc<IdentityService>,
    pub store: Arc<MessageStore>,
    pub active_runs: Arc<ActiveRuns>,
    pub run_queues: Arc<RunQueues>,
    pub owner_queues: Arc<OwnerQueues>,
}
