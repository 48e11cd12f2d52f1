use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::audit::{AuditSink, SecurityEvent, SecurityEventType};
use crate::sanitize::find_injection_rules;

/// Only a prefix of a suspicious prompt is retained in the audit log.
const MAX_LOGGED_PROMPT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

/// A user-visible toast. The core never renders; it hands notices to the
/// injected sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotice {
    pub severity: NoticeSeverity,
    pub message: String,
}

impl UserNotice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: UserNotice);
}

/// Drops every notice; useful for headless contexts and tests that do not
/// assert on toasts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: UserNotice) {}
}

/// Detects and records security-relevant events. Audit appends are
/// best-effort: a sink failure is logged and never propagated to the caller.
#[derive(Clone)]
pub struct SecurityMonitor {
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
}

impl SecurityMonitor {
    pub fn new(audit: Arc<dyn AuditSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self { audit, notifier }
    }

    /// Gates an outbound AI prompt against the shared injection rule table.
    /// On a match: one `suspicious_ai_prompt` event (first 100 chars of the
    /// prompt plus the matched-rule count), a blocked notice, and `false`.
    /// The caller must abort without further user messaging.
    pub async fn monitor_ai_prompt(&self, user_id: Option<&str>, prompt: &str) -> bool {
        let matched = find_injection_rules(prompt);
        if matched.is_empty() {
            return true;
        }

        let mut details = HashMap::new();
        details.insert(
            "prompt_prefix".to_string(),
            prompt.chars().take(MAX_LOGGED_PROMPT_CHARS).collect(),
        );
        details.insert("matched_rule_count".to_string(), matched.len().to_string());
        self.record(SecurityEventType::SuspiciousAiPrompt, user_id, details)
            .await;

        self.notifier.notify(UserNotice::warning(
            "Your request was blocked by the content safety filter.",
        ));
        false
    }

    pub async fn monitor_failed_auth(&self, user_id: Option<&str>, error: &str) {
        let mut details = HashMap::new();
        details.insert("error".to_string(), error.to_string());
        self.record(SecurityEventType::FailedAuth, user_id, details)
            .await;
    }

    pub async fn monitor_file_upload_failure(
        &self,
        user_id: Option<&str>,
        file_name: &str,
        error: &str,
    ) {
        let mut details = HashMap::new();
        details.insert("file_name".to_string(), file_name.to_string());
        details.insert("error".to_string(), error.to_string());
        self.record(SecurityEventType::FileUploadFailure, user_id, details)
            .await;
    }

    pub async fn record_rate_limited(&self, user_id: Option<&str>, action: &str) {
        let mut details = HashMap::new();
        details.insert("action".to_string(), action.to_string());
        self.record(SecurityEventType::RateLimitExceeded, user_id, details)
            .await;
    }

    pub async fn record_session_event(
        &self,
        event_type: SecurityEventType,
        user_id: Option<&str>,
        details: HashMap<String, String>,
    ) {
        self.record(event_type, user_id, details).await;
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    async fn record(
        &self,
        event_type: SecurityEventType,
        user_id: Option<&str>,
        details: HashMap<String, String>,
    ) {
        let event = SecurityEvent::new(event_type, user_id, details);
        if let Err(err) = self.audit.append(event).await {
            warn!(event_type = event_type.as_str(), "audit append failed: {err}");
        }
    }
}
