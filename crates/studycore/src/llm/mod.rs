pub mod content;
pub mod fallback;
pub mod gateway;
pub mod openrouter;
pub mod orchestrator;
pub mod parser;
pub mod prompts;

pub use content::{ContentError, ContentKind, Difficulty, GeneratedContent};
pub use gateway::{
    ChatTurn, CompletionError, CompletionGateway, CompletionRequest, CompletionResponse,
    TokenUsage,
};
pub use openrouter::{OpenRouterGateway, OpenRouterGatewayConfig, OpenRouterModelRoute};
pub use orchestrator::{
    ChatExchange, ContentOrchestrator, GenerateOutcome, GenerateRequest, OrchestratorError,
};
