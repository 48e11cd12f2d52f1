use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::models::ChatRole;

pub const DEFAULT_MAX_TOKENS: u32 = 1_500;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CompletionResponse, CompletionError>> + Send + 'a>>;

/// One prior conversation turn carried with a chat completion.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub history: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            history: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub model: String,
    pub provider_request_id: Option<String>,
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("model provider timed out")]
    Timeout,
    #[error("model provider failure: {0}")]
    ProviderFailure(String),
    #[error("invalid provider payload: {0}")]
    InvalidPayload(String),
}

/// Provider boundary. Everything upstream of this trait is deterministic;
/// everything behind it talks to a remote model.
pub trait CompletionGateway: Send + Sync {
    fn complete<'a>(&'a self, request: CompletionRequest) -> CompletionFuture<'a>;
}
