use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rag_core::{ConversationMessage, ConversationStore};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Conversation history kept as one Redis list per session.
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    history_limit: usize,
    ttl: Option<Duration>,
}

impl RedisSessionStore {
    pub async fn connect(
        redis_url: &str,
        history_limit: usize,
        ttl: Option<Duration>,
    ) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .context("Redis connection timed out")?
            .context("Failed to connect to Redis")?;

        tracing::info!("Connected to Redis session store");

        Ok(Self {
            conn,
            history_limit: history_limit.max(1),
            ttl,
        })
    }

    fn key(session_id: &Uuid) -> String {
        format!("session:{}", session_id)
    }
}

#[async_trait]
impl ConversationStore for RedisSessionStore {
    async fn history(&self, session_id: &Uuid) -> Result<Vec<ConversationMessage>> {
        let mut conn = self.conn.clone();
        let entries: Vec<String> = conn
            .lrange(Self::key(session_id), 0, -1)
            .await
            .context("Failed to get session from Redis")?;

        entries
            .iter()
            .map(|json| {
                serde_json::from_str(json).context("Failed to deserialize session message")
            })
            .collect()
    }

    async fn append(&self, session_id: &Uuid, message: ConversationMessage) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::key(session_id);
        let json = serde_json::to_string(&message).context("Failed to serialize message")?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(&key, json)
            .ignore()
            .ltrim(&key, -(self.history_limit as isize), -1)
            .ignore();
        if let Some(ttl) = self.ttl {
            pipe.expire(&key, ttl.as_secs() as i64).ignore();
        }

        pipe.query_async::<_, ()>(&mut conn)
            .await
            .context("Failed to store session message in Redis")?;

        Ok(())
    }

    async fn delete(&self, session_id: &Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(Self::key(session_id))
            .await
            .context("Failed to delete session from Redis")?;

        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Role;

    #[tokio::test]
    async fn should_store_and_trim_history_when_redis_is_available() {
        let store = match RedisSessionStore::connect(
            "redis://localhost:6379",
            2,
            Some(Duration::from_secs(60)),
        )
        .await
        {
            Ok(store) => store,
            Err(_) => {
                println!("Redis not available, skipping integration test");
                return;
            }
        };
        let session_id = Uuid::new_v4();

        assert!(store.history(&session_id).await.unwrap().is_empty());

        store
            .append(&session_id, ConversationMessage::user("first"))
            .await
            .unwrap();
        store
            .append(&session_id, ConversationMessage::assistant("second"))
            .await
            .unwrap();
        store
            .append(&session_id, ConversationMessage::user("third"))
            .await
            .unwrap();

        let history = store.history(&session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(history[0].content, "second");
        assert_eq!(history[1].content, "third");

        assert!(store.delete(&session_id).await.unwrap());
        assert!(!store.delete(&session_id).await.unwrap());
        assert!(store.history(&session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_handle_redis_connection_error() {
        let result = RedisSessionStore::connect("redis://invalid:6379", 10, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_reject_malformed_url() {
        let result = RedisSessionStore::connect("not-a-redis-url", 10, None).await;
        assert!(result.is_err());
    }
}
