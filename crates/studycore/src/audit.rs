use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

pub type AuditFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    FailedAuth,
    SuspiciousAiPrompt,
    FileUploadFailure,
    RateLimitExceeded,
    SessionTimeoutWarning,
    SessionExpired,
}

impl SecurityEventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailedAuth => "failed_auth",
            Self::SuspiciousAiPrompt => "suspicious_ai_prompt",
            Self::FileUploadFailure => "file_upload_failure",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::SessionTimeoutWarning => "session_timeout_warning",
            Self::SessionExpired => "session_expired",
        }
    }
}

/// Write-once record of a security-relevant occurrence. Created on detection,
/// appended to a sink, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub user_id: Option<String>,
    pub details: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        user_id: Option<&str>,
        details: HashMap<String, String>,
    ) -> Self {
        Self {
            event_type,
            user_id: user_id.map(ToString::to_string),
            details,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only audit log capability. Appends are best-effort from the
/// caller's point of view: the monitor logs a failure and carries on.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: SecurityEvent) -> AuditFuture<'_>;
}

/// In-process sink; the default wiring and the one tests inspect.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count_of(&self, event_type: SecurityEventType) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: SecurityEvent) -> AuditFuture<'_> {
        Box::pin(async move {
            let redacted = SecurityEvent {
                details: redact_sensitive_details(&event.details),
                ..event
            };
            self.events.lock().await.push(redacted);
            Ok(())
        })
    }
}

fn is_sensitive_detail_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("token")
        || key.contains("secret")
        || key.contains("password")
        || key.contains("authorization")
}

pub fn redact_sensitive_details(details: &HashMap<String, String>) -> HashMap<String, String> {
    details
        .iter()
        .map(|(key, value)| {
            if is_sensitive_detail_key(key) {
                (key.clone(), "[REDACTED]".to_string())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
