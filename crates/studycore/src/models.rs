use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Only the most recent turns travel with each AI request.
pub const CHAT_CONTEXT_TURNS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content)
    }

    fn with_role(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only conversation transcript, persisted through the external
/// repository on explicit save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub topic: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(title: impl Into<String>, topic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            topic: topic.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// The last 10 turns, oldest first.
    pub fn context_window(&self) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(CHAT_CONTEXT_TURNS);
        &self.messages[start..]
    }
}

pub type RepoFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("chat session not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// External persistence capability. The backing store is someone else's
/// problem; the core only issues owner-scoped CRUD calls through it.
pub trait ChatSessionRepository: Send + Sync {
    fn insert<'a>(&'a self, owner_id: &'a str, session: &'a ChatSession) -> RepoFuture<'a, ()>;
    fn update<'a>(&'a self, owner_id: &'a str, session: &'a ChatSession) -> RepoFuture<'a, ()>;
    fn delete<'a>(&'a self, owner_id: &'a str, session_id: Uuid) -> RepoFuture<'a, ()>;
    fn list<'a>(&'a self, owner_id: &'a str) -> RepoFuture<'a, Vec<ChatSession>>;
}

#[derive(Debug, Default)]
pub struct MemoryChatSessionRepository {
    sessions: Mutex<HashMap<String, Vec<ChatSession>>>,
}

impl MemoryChatSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatSessionRepository for MemoryChatSessionRepository {
    fn insert<'a>(&'a self, owner_id: &'a str, session: &'a ChatSession) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            self.sessions
                .lock()
                .await
                .entry(owner_id.to_string())
                .or_default()
                .push(session.clone());
            Ok(())
        })
    }

    fn update<'a>(&'a self, owner_id: &'a str, session: &'a ChatSession) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let mut sessions = self.sessions.lock().await;
            let owned = sessions.get_mut(owner_id).ok_or(RepositoryError::NotFound)?;
            let slot = owned
                .iter_mut()
                .find(|existing| existing.id == session.id)
                .ok_or(RepositoryError::NotFound)?;
            *slot = session.clone();
            Ok(())
        })
    }

    fn delete<'a>(&'a self, owner_id: &'a str, session_id: Uuid) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let mut sessions = self.sessions.lock().await;
            let owned = sessions.get_mut(owner_id).ok_or(RepositoryError::NotFound)?;
            let before = owned.len();
            owned.retain(|existing| existing.id != session_id);
            if owned.len() == before {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        })
    }

    fn list<'a>(&'a self, owner_id: &'a str) -> RepoFuture<'a, Vec<ChatSession>> {
        Box::pin(async move {
            Ok(self
                .sessions
                .lock()
                .await
                .get(owner_id)
                .cloned()
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, ChatSession, ChatSessionRepository, MemoryChatSessionRepository};

    #[test]
    fn context_window_keeps_only_the_last_ten_turns() {
        let mut session = ChatSession::new("Biology help", "Photosynthesis");
        for index in 0..13 {
            session.push(ChatMessage::user(format!("message {index}")));
        }

        let window = session.context_window();
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].content, "message 3");
        assert_eq!(window[9].content, "message 12");
    }

    #[test]
    fn short_transcripts_are_returned_whole() {
        let mut session = ChatSession::new("Chem", "Stoichiometry");
        session.push(ChatMessage::user("hi"));
        assert_eq!(session.context_window().len(), 1);
    }

    #[tokio::test]
    async fn repository_round_trip_is_owner_scoped() {
        let repo = MemoryChatSessionRepository::new();
        let session = ChatSession::new("Notes", "Cell division");

        repo.insert("owner-1", &session).await.expect("insert should succeed");
        assert_eq!(repo.list("owner-1").await.expect("list").len(), 1);
        assert!(repo.list("owner-2").await.expect("list").is_empty());

        let mut updated = session.clone();
        updated.title = "Renamed".to_string();
        repo.update("owner-1", &updated).await.expect("update should succeed");
        let listed = repo.list("owner-1").await.expect("list");
        assert_eq!(listed[0].title, "Renamed");

        repo.delete("owner-1", session.id).await.expect("delete should succeed");
        assert!(repo.list("owner-1").await.expect("list").is_empty());
    }
}
