use std::collections::HashMap;
use std::sync::Arc;

use nx_domain::models::Run;
use parking_lot::RwLock;
use tokio::sync::Mutex;

/// The orchestrator's only shared mutable state (spec §5): one entry per
/// live run, each guarded by its own lock so handlers for different runs
/// never block each other, while handlers for the *same* run (e.g. two
/// `tools.results` arriving concurrently) are serialized.
#[derive(Default)]
pub struct ActiveRuns {
    runs: RwLock<HashMap<String, Arc<Mutex<Run>>>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run: Run) {
        self.runs.write().insert(run.id.clone(), Arc::new(Mutex::new(run)));
    }

    pub fn get(&self, run_id: &str) -> Option<Arc<Mutex<Run>>> {
        self.runs.read().get(run_id).cloned()
    }

    pub fn remove(&self, run_id: &str) {
        self.runs.write().remove(run_id);
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let active = ActiveRuns::new();
        let run = Run::new("0xabc");
        let id = run.id.clone();
        active.insert(run);
        let found = active.get(&id).unwrap();
        assert_eq!(found.lock().await.owner_key, "0xabc");
    }

    #[test]
    fn remove_drops_the_entry() {
        let active = ActiveRuns::new();
        let run = Run::new("0xabc");
        let id = run.id.clone();
        active.insert(run);
        active.remove(&id);
        assert!(active.get(&id).is_none());
    }
}
