use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_CHAT_MAX_MESSAGES: u32 = 20;
const DEFAULT_CHAT_WINDOW_MS: u64 = 60_000;
const DEFAULT_GENERATE_MAX_REQUESTS: u32 = 10;
const DEFAULT_GENERATE_WINDOW_MS: u64 = 3_600_000;
const DEFAULT_SESSION_WARNING_AFTER_MS: u64 = 1_800_000;
const DEFAULT_SESSION_EXPIRE_AFTER_MS: u64 = 2_100_000;
const DEFAULT_MAX_TAG_CHARS: usize = 20;
const DEFAULT_MAX_TAGS_PER_FLASHCARD: usize = 10;
const DEFAULT_MAX_TEXT_UPLOAD_CHARS: usize = 50_000;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_AI_INPUT_CHARS: usize = 5_000;

/// Behavioral limits for the security and generation pipelines. The defaults
/// are the product's contractual values; env overrides exist for load tests
/// and local development.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub chat_max_messages: u32,
    pub chat_window_ms: u64,
    pub generate_max_requests: u32,
    pub generate_window_ms: u64,
    pub session_warning_after_ms: u64,
    pub session_expire_after_ms: u64,
    pub max_tag_chars: usize,
    pub max_tags_per_flashcard: usize,
    pub max_text_upload_chars: usize,
    pub max_upload_bytes: u64,
    pub max_ai_input_chars: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            chat_max_messages: DEFAULT_CHAT_MAX_MESSAGES,
            chat_window_ms: DEFAULT_CHAT_WINDOW_MS,
            generate_max_requests: DEFAULT_GENERATE_MAX_REQUESTS,
            generate_window_ms: DEFAULT_GENERATE_WINDOW_MS,
            session_warning_after_ms: DEFAULT_SESSION_WARNING_AFTER_MS,
            session_expire_after_ms: DEFAULT_SESSION_EXPIRE_AFTER_MS,
            max_tag_chars: DEFAULT_MAX_TAG_CHARS,
            max_tags_per_flashcard: DEFAULT_MAX_TAGS_PER_FLASHCARD,
            max_text_upload_chars: DEFAULT_MAX_TEXT_UPLOAD_CHARS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_ai_input_chars: DEFAULT_MAX_AI_INPUT_CHARS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.chat_max_messages =
            parse_u32_env("STUDYCORE_CHAT_MAX_MESSAGES", config.chat_max_messages)?;
        config.chat_window_ms = parse_u64_env("STUDYCORE_CHAT_WINDOW_MS", config.chat_window_ms)?;
        config.generate_max_requests = parse_u32_env(
            "STUDYCORE_GENERATE_MAX_REQUESTS",
            config.generate_max_requests,
        )?;
        config.generate_window_ms =
            parse_u64_env("STUDYCORE_GENERATE_WINDOW_MS", config.generate_window_ms)?;
        config.session_warning_after_ms = parse_u64_env(
            "STUDYCORE_SESSION_WARNING_AFTER_MS",
            config.session_warning_after_ms,
        )?;
        config.session_expire_after_ms = parse_u64_env(
            "STUDYCORE_SESSION_EXPIRE_AFTER_MS",
            config.session_expire_after_ms,
        )?;
        config.max_tag_chars = parse_usize_env("STUDYCORE_MAX_TAG_CHARS", config.max_tag_chars)?;
        config.max_tags_per_flashcard = parse_usize_env(
            "STUDYCORE_MAX_TAGS_PER_FLASHCARD",
            config.max_tags_per_flashcard,
        )?;
        config.max_text_upload_chars = parse_usize_env(
            "STUDYCORE_MAX_TEXT_UPLOAD_CHARS",
            config.max_text_upload_chars,
        )?;
        config.max_upload_bytes =
            parse_u64_env("STUDYCORE_MAX_UPLOAD_BYTES", config.max_upload_bytes)?;
        config.max_ai_input_chars =
            parse_usize_env("STUDYCORE_MAX_AI_INPUT_CHARS", config.max_ai_input_chars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat_max_messages == 0 || self.generate_max_requests == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "rate limit maxima must be greater than 0".to_string(),
            ));
        }
        if self.chat_window_ms == 0 || self.generate_window_ms == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "rate limit windows must be greater than 0".to_string(),
            ));
        }
        if self.session_warning_after_ms == 0
            || self.session_expire_after_ms <= self.session_warning_after_ms
        {
            return Err(ConfigError::InvalidConfiguration(
                "session expiry must come after the warning".to_string(),
            ));
        }
        if self.max_ai_input_chars == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "STUDYCORE_MAX_AI_INPUT_CHARS must be greater than 0".to_string(),
            ));
        }
        if self.max_tag_chars == 0
            || self.max_tags_per_flashcard == 0
            || self.max_text_upload_chars == 0
            || self.max_upload_bytes == 0
        {
            return Err(ConfigError::InvalidConfiguration(
                "tag and upload maxima must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn chat_window(&self) -> Duration {
        Duration::from_millis(self.chat_window_ms)
    }

    pub fn generate_window(&self) -> Duration {
        Duration::from_millis(self.generate_window_ms)
    }

    pub fn session_warning_after(&self) -> Duration {
        Duration::from_millis(self.session_warning_after_ms)
    }

    pub fn session_expire_after(&self) -> Duration {
        Duration::from_millis(self.session_expire_after_ms)
    }
}

fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match optional_trimmed_env(key) {
        Some(value) => value
            .parse::<u32>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_trimmed_env(key) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match optional_trimmed_env(key) {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}
