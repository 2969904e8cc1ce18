use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::types::ConversationState;

/// Held while one message updates its sender's memory
pub type SenderGuard = OwnedMutexGuard<()>;

/// Thread-safe in-memory conversation store.
///
/// Entries are never evicted; the map grows with the number of distinct
/// senders seen since start-up.
#[derive(Clone, Default)]
pub struct ConversationMemory {
    /// sender_id -> ConversationState
    storage: Arc<DashMap<String, ConversationState>>,

    /// sender_id -> lock serialising that sender's memory updates
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other message from `sender_id` is updating memory.
    ///
    /// The guard must be held across the whole get/update cycle so two
    /// messages from the same sender cannot interleave.
    pub async fn lock_sender(&self, sender_id: &str) -> SenderGuard {
        let lock = self
            .locks
            .entry(sender_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn get(&self, sender_id: &str) -> Option<ConversationState> {
        self.storage.get(sender_id).map(|entry| entry.value().clone())
    }

    /// Record a new medical topic. Topic and query always move together.
    pub fn set_topic(&self, sender_id: &str, topic: &str, query: &str) {
        self.storage.insert(
            sender_id.to_string(),
            ConversationState {
                last_topic: Some(topic.to_string()),
                last_query: Some(query.to_string()),
            },
        );
        debug!("Updated topic for sender {}", sender_id);
    }

    /// Replace only the remembered query; the topic stays on the original question.
    pub fn set_query(&self, sender_id: &str, query: &str) {
        self.storage
            .entry(sender_id.to_string())
            .or_default()
            .last_query = Some(query.to_string());
        debug!("Updated last query for sender {}", sender_id);
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_topic_round_trip() {
        let memory = ConversationMemory::new();
        assert!(memory.get("s").is_none());

        memory.set_topic("s", "typhoid", "what is typhoid");

        assert_eq!(
            memory.get("s"),
            Some(ConversationState {
                last_topic: Some("typhoid".to_string()),
                last_query: Some("what is typhoid".to_string()),
            })
        );
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_set_query_keeps_topic() {
        let memory = ConversationMemory::new();
        memory.set_topic("s", "I have typhoid", "I have typhoid");
        memory.set_query("s", "rewritten follow-up");

        let state = memory.get("s").unwrap();
        assert_eq!(state.last_topic.as_deref(), Some("I have typhoid"));
        assert_eq!(state.last_query.as_deref(), Some("rewritten follow-up"));
    }

    #[test]
    fn test_senders_are_isolated() {
        let memory = ConversationMemory::new();
        memory.set_topic("a", "dengue", "dengue");

        assert!(memory.get("b").is_none());
        assert!(!memory.is_empty());
    }

    #[tokio::test]
    async fn test_same_sender_is_serialised() {
        let memory = ConversationMemory::new();
        let guard = memory.lock_sender("s").await;

        let contender = memory.clone();
        let blocked = tokio::time::timeout(Duration::from_millis(50), async move {
            contender.lock_sender("s").await
        })
        .await;
        assert!(blocked.is_err(), "second lock must wait for the first");

        // a different sender is not held up
        let other = tokio::time::timeout(Duration::from_millis(50), memory.lock_sender("t")).await;
        assert!(other.is_ok());

        drop(guard);
        let after = tokio::time::timeout(Duration::from_millis(50), memory.lock_sender("s")).await;
        assert!(after.is_ok());
    }
}
