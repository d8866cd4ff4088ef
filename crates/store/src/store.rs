use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use nx_domain::models::Message;
use parking_lot::RwLock;

/// Bounded in-memory ring of recently persisted messages, backed by an
/// append-only JSONL file for durability across restarts. Infrastructure is
/// idempotent at the message-id level; the service itself never retries.
const MAX_MESSAGES_IN_MEMORY: usize = 10_000;

pub struct MessageStore {
    path: PathBuf,
    ring: RwLock<VecDeque<Message>>,
}

impl MessageStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ring = RwLock::new(load_recent(&path, MAX_MESSAGES_IN_MEMORY));
        Self { path, ring }
    }

    /// Appends to the JSONL file and the in-memory ring. Failures are
    /// logged, never raised — Persistence never surfaces errors to the bus.
    pub fn persist(&self, message: Message) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create message store directory");
            }
        }
        match serde_json::to_string(&message) {
            Ok(line) => {
                use std::io::Write;
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path);
                match file {
                    Ok(mut f) => {
                        if let Err(e) = writeln!(f, "{line}") {
                            tracing::warn!(error = %e, "failed to append message to store");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to open message store file"),
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize message"),
        }

        let mut ring = self.ring.write();
        ring.push_back(message);
        while ring.len() > MAX_MESSAGES_IN_MEMORY {
            ring.pop_front();
        }
    }

    /// Most recent `limit` messages for `owner_key`, newest-first. Never
    /// raises; an empty ring or no matches just yields an empty vec.
    pub fn get_history(&self, owner_key: &str, limit: usize) -> Vec<Message> {
        self.ring
            .read()
            .iter()
            .rev()
            .filter(|m| m.owner_key == owner_key)
            .take(limit)
            .cloned()
            .collect()
    }
}

fn load_recent(path: &Path, max: usize) -> VecDeque<Message> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return VecDeque::new();
    };
    let mut messages: VecDeque<Message> = raw
        .lines()
        .rev()
        .take(max)
        .filter_map(|line| match serde_json::from_str::<Message>(line) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "skipping corrupt message store line");
                None
            }
        })
        .collect();
    // lines were read newest-first above; restore chronological order.
    messages.make_contiguous().reverse();
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use nx_domain::models::{MessageContent, Role};

    fn msg(owner: &str, text: &str) -> Message {
        Message::new("run_1", owner, Role::Human, MessageContent::Text(text.into()))
    }

    #[test]
    fn empty_store_yields_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("messages.jsonl"));
        assert!(store.get_history("0xabc", 10).is_empty());
    }

    #[test]
    fn get_history_filters_by_owner_and_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("messages.jsonl"));
        store.persist(msg("0xabc", "first"));
        store.persist(msg("0xdef", "other-owner"));
        store.persist(msg("0xabc", "second"));

        let history = store.get_history("0xabc", 10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content.as_text(), Some("second"));
        assert_eq!(history[1].content.as_text(), Some("first"));
    }

    #[test]
    fn get_history_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("messages.jsonl"));
        for i in 0..5 {
            store.persist(msg("0xabc", &format!("msg{i}")));
        }
        assert_eq!(store.get_history("0xabc", 2).len(), 2);
    }

    #[test]
    fn reloads_from_disk_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        {
            let store = MessageStore::new(&path);
            store.persist(msg("0xabc", "persisted"));
        }
        let reloaded = MessageStore::new(&path);
        let history = reloaded.get_history("0xabc", 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content.as_text(), Some("persisted"));
    }
}
