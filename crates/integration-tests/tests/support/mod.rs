use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use studycore::audit::MemoryAuditSink;
use studycore::config::SecurityConfig;
use studycore::llm::gateway::{
    CompletionError, CompletionFuture, CompletionGateway, CompletionRequest, CompletionResponse,
};
use studycore::llm::ContentOrchestrator;
use studycore::monitor::{Notifier, SecurityMonitor, UserNotice};
use studycore::ratelimit::MemoryRateLimitStore;

/// Scripted provider. Replies are popped in order; once exhausted every call
/// fails, which keeps accidental extra provider calls visible in assertions.
pub struct StubGateway {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubGateway {
    pub fn with_replies(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionGateway for StubGateway {
    fn complete<'a>(&'a self, request: CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CompletionError::ProviderFailure("exhausted".into())));
            reply.map(|text| CompletionResponse {
                model: "stub-model".to_string(),
                provider_request_id: Some("req-1".to_string()),
                text,
                usage: None,
            })
        })
    }
}

/// Captures toasts so tests can assert on user messaging.
#[derive(Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<UserNotice>>,
}

impl CollectingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<UserNotice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: UserNotice) {
        self.notices.lock().unwrap().push(notice);
    }
}

pub struct Harness {
    pub orchestrator: ContentOrchestrator,
    pub gateway: Arc<StubGateway>,
    pub audit: Arc<MemoryAuditSink>,
    pub notifier: Arc<CollectingNotifier>,
}

pub fn harness(replies: Vec<Result<String, CompletionError>>) -> Harness {
    let gateway = StubGateway::with_replies(replies);
    let audit = Arc::new(MemoryAuditSink::new());
    let notifier = CollectingNotifier::new();
    let monitor = SecurityMonitor::new(audit.clone(), notifier.clone());
    let orchestrator = ContentOrchestrator::new(
        gateway.clone(),
        monitor,
        Arc::new(MemoryRateLimitStore::new()),
        SecurityConfig::default(),
    );
    Harness {
        orchestrator,
        gateway,
        audit,
        notifier,
    }
}
