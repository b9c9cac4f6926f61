use crate::ConversationMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Per-session conversation history, shared across request handlers.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn history(&self, session_id: &Uuid) -> anyhow::Result<Vec<ConversationMessage>>;

    async fn append(&self, session_id: &Uuid, message: ConversationMessage)
        -> anyhow::Result<()>;

    /// Returns false when the session did not exist.
    async fn delete(&self, session_id: &Uuid) -> anyhow::Result<bool>;

    /// Drops idle sessions. Backends with native expiry keep the default.
    async fn purge_expired(&self) -> anyhow::Result<usize> {
        Ok(0)
    }
}

#[derive(Debug)]
struct SessionData {
    messages: Vec<ConversationMessage>,
    last_accessed: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<Uuid, SessionData>,
    history_limit: usize,
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            history_limit,
        }
    }

    pub fn get(&self, session_id: &Uuid) -> Vec<ConversationMessage> {
        self.sessions
            .get(session_id)
            .map(|data| data.messages.clone())
            .unwrap_or_default()
    }

    pub fn append(&mut self, session_id: &Uuid, message: ConversationMessage) {
        let now = Instant::now();
        let session_data = self
            .sessions
            .entry(*session_id)
            .or_insert_with(|| SessionData {
                messages: Vec::new(),
                last_accessed: now,
            });

        session_data.messages.push(message);
        session_data.last_accessed = now;

        let overflow = session_data
            .messages
            .len()
            .saturating_sub(self.history_limit);
        if overflow > 0 {
            session_data.messages.drain(..overflow);
        }
    }

    pub fn remove(&mut self, session_id: &Uuid) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Removes sessions idle for at least `ttl` and returns how many went.
    pub fn gc(&mut self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session_data| now.duration_since(session_data.last_accessed) < ttl);
        before - self.sessions.len()
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub struct InMemorySessionStore {
    inner: Mutex<SessionStore>,
    ttl: Option<Duration>,
}

impl InMemorySessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(SessionStore::new(history_limit)),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemorySessionStore {
    async fn history(&self, session_id: &Uuid) -> anyhow::Result<Vec<ConversationMessage>> {
        Ok(self.inner.lock().await.get(session_id))
    }

    async fn append(
        &self,
        session_id: &Uuid,
        message: ConversationMessage,
    ) -> anyhow::Result<()> {
        self.inner.lock().await.append(session_id, message);
        Ok(())
    }

    async fn delete(&self, session_id: &Uuid) -> anyhow::Result<bool> {
        Ok(self.inner.lock().await.remove(session_id))
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        match self.ttl {
            Some(ttl) => Ok(self.inner.lock().await.gc(ttl)),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    #[test]
    fn should_create_empty_session_store() {
        let store = SessionStore::new(10);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.history_limit(), 10);
    }

    #[test]
    fn should_get_empty_messages_for_new_session() {
        let store = SessionStore::new(10);
        let messages = store.get(&Uuid::new_v4());
        assert!(messages.is_empty());
    }

    #[test]
    fn should_append_messages_in_order() {
        let mut store = SessionStore::new(10);
        let session_id = Uuid::new_v4();

        let question = ConversationMessage::user("Hello");
        let answer = ConversationMessage::assistant("Hi there!");

        store.append(&session_id, question.clone());
        store.append(&session_id, answer.clone());

        let messages = store.get(&session_id);
        assert_eq!(messages, vec![question, answer]);
    }

    #[test]
    fn should_keep_separate_sessions() {
        let mut store = SessionStore::new(10);
        let session1 = Uuid::new_v4();
        let session2 = Uuid::new_v4();

        store.append(&session1, ConversationMessage::user("Session 1"));
        store.append(&session2, ConversationMessage::user("Session 2"));

        assert_eq!(store.get(&session1)[0].content, "Session 1");
        assert_eq!(store.get(&session2)[0].content, "Session 2");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn should_trim_history_to_last_entries() {
        let mut store = SessionStore::new(3);
        let session_id = Uuid::new_v4();

        for i in 0..5 {
            store.append(&session_id, ConversationMessage::user(format!("message {i}")));
        }

        let contents: Vec<String> = store
            .get(&session_id)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
    }

    #[test]
    fn should_remove_session() {
        let mut store = SessionStore::new(10);
        let session_id = Uuid::new_v4();
        store.append(&session_id, ConversationMessage::user("Test"));

        assert!(store.remove(&session_id));
        assert!(!store.remove(&session_id));
        assert!(store.get(&session_id).is_empty());
    }

    #[test]
    fn should_cleanup_expired_sessions() {
        let mut store = SessionStore::new(10);
        store.append(&Uuid::new_v4(), ConversationMessage::user("Test"));
        assert_eq!(store.len(), 1);

        // A zero TTL expires everything.
        assert_eq!(store.gc(Duration::from_millis(0)), 1);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn should_not_cleanup_recent_sessions() {
        let mut store = SessionStore::new(10);
        store.append(&Uuid::new_v4(), ConversationMessage::user("Test"));

        assert_eq!(store.gc(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn should_share_history_through_conversation_store() {
        let store = InMemorySessionStore::new(4);
        let session_id = Uuid::new_v4();

        store
            .append(&session_id, ConversationMessage::user("What is RAG?"))
            .await
            .unwrap();
        store
            .append(
                &session_id,
                ConversationMessage::assistant("Retrieval-augmented generation."),
            )
            .await
            .unwrap();

        let history = store.history(&session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);

        assert!(store.delete(&session_id).await.unwrap());
        assert!(!store.delete(&session_id).await.unwrap());
        assert!(store.history(&session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_purge_only_when_ttl_configured() {
        let without_ttl = InMemorySessionStore::new(4);
        without_ttl
            .append(&Uuid::new_v4(), ConversationMessage::user("kept"))
            .await
            .unwrap();
        assert_eq!(without_ttl.purge_expired().await.unwrap(), 0);
        assert_eq!(without_ttl.len().await, 1);

        let with_ttl = InMemorySessionStore::new(4).with_ttl(Duration::from_millis(0));
        with_ttl
            .append(&Uuid::new_v4(), ConversationMessage::user("expired"))
            .await
            .unwrap();
        assert_eq!(with_ttl.purge_expired().await.unwrap(), 1);
        assert_eq!(with_ttl.len().await, 0);
    }
}
