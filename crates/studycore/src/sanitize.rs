use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::config::SecurityConfig;

pub const MAX_CHAT_MESSAGE_CHARS: usize = 2_000;
pub const MAX_QUESTION_CHARS: usize = 1_000;
pub const MAX_ANSWER_CHARS: usize = 2_000;

pub const ALLOWED_UPLOAD_MIME_TYPES: [&str; 4] =
    ["application/pdf", "text/plain", "image/jpeg", "image/png"];

/// Single source of truth for the prompt-injection heuristics. Both
/// `validate_ai_input` and `SecurityMonitor::monitor_ai_prompt` consume this
/// table; matching is case-insensitive substring containment, so the first
/// rule covers both "instruction" and "instructions".
pub const INJECTION_RULES: [&str; 5] = [
    "ignore previous instruction",
    "system prompt",
    "you are now",
    "forget everything",
    "new role",
];

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern should compile")
});
static IFRAME_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<iframe\b[^>]*>.*?</iframe\s*>").expect("iframe pattern should compile")
});
static OBJECT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<object\b[^>]*>.*?</object\s*>").expect("object pattern should compile")
});
static EMBED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<embed\b[^>]*>?").expect("embed pattern should compile")
});
static STRAY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:script|iframe|object)\b[^>]*>?")
        .expect("stray tag pattern should compile")
});
static JAVASCRIPT_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("javascript pattern should compile"));
static EVENT_HANDLER_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bon\w+\s*=").expect("event handler pattern should compile")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be between 1 and {max} characters")]
    LengthOutOfRange { field: &'static str, max: usize },
    #[error("invalid input detected")]
    InjectionDetected,
    #[error("message contains disallowed markup")]
    DisallowedMarkup,
    #[error("difficulty must be one of easy, medium, hard")]
    InvalidDifficulty,
    #[error("a flashcard allows at most {max} tags")]
    TooManyTags { max: usize },
    #[error("tags must be between 1 and {max} characters")]
    TagLengthOutOfRange { max: usize },
    #[error("unsupported file type {0}")]
    UnsupportedFileType(String),
    #[error("file exceeds {max_bytes} bytes")]
    FileTooLarge { max_bytes: u64 },
    #[error("text upload exceeds {max_chars} characters")]
    TextUploadTooLong { max_chars: usize },
}

/// Strips script/iframe/object/embed tags, `javascript:` URI prefixes, and
/// inline event-handler attributes by pattern substitution.
///
/// This is deliberately not a full HTML parser: obfuscated or nested payloads
/// can survive a single pass. Callers must not treat the output as fully
/// HTML-safe; the guarantee is only that the listed patterns are absent.
pub fn sanitize_html(text: &str) -> String {
    let cleaned = SCRIPT_BLOCK.replace_all(text, "");
    let cleaned = IFRAME_BLOCK.replace_all(&cleaned, "");
    let cleaned = OBJECT_BLOCK.replace_all(&cleaned, "");
    let cleaned = EMBED_TAG.replace_all(&cleaned, "");
    let cleaned = STRAY_TAG.replace_all(&cleaned, "");
    let cleaned = JAVASCRIPT_URI.replace_all(&cleaned, "");
    EVENT_HANDLER_ATTR.replace_all(&cleaned, "").into_owned()
}

/// Returns every injection rule the text matches, in table order.
pub fn find_injection_rules(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    INJECTION_RULES
        .iter()
        .copied()
        .filter(|rule| lowered.contains(rule))
        .collect()
}

/// Validates free text bound for an outbound AI prompt: 1..=max chars and no
/// injection-rule match. The error is intentionally generic so the matched
/// rule is not leaked back to the caller.
pub fn validate_ai_input(text: &str, max_chars: usize) -> Result<&str, ValidationError> {
    let length = text.chars().count();
    if length == 0 || length > max_chars {
        return Err(ValidationError::LengthOutOfRange {
            field: "input",
            max: max_chars,
        });
    }
    if !find_injection_rules(text).is_empty() {
        return Err(ValidationError::InjectionDetected);
    }
    Ok(text)
}

pub fn validate_chat_message(text: &str) -> Result<&str, ValidationError> {
    let length = text.chars().count();
    if length == 0 || length > MAX_CHAT_MESSAGE_CHARS {
        return Err(ValidationError::LengthOutOfRange {
            field: "message",
            max: MAX_CHAT_MESSAGE_CHARS,
        });
    }
    if text.to_lowercase().contains("<script") {
        return Err(ValidationError::DisallowedMarkup);
    }
    Ok(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashcardDraft {
    pub question: String,
    pub answer: String,
    pub difficulty: String,
    pub tags: Option<Vec<String>>,
}

/// Tag limits come from the shared `SecurityConfig` so there is a single
/// source of truth for the configurable bounds.
pub fn validate_flashcard(
    draft: FlashcardDraft,
    config: &SecurityConfig,
) -> Result<FlashcardDraft, ValidationError> {
    let question_length = draft.question.chars().count();
    if question_length == 0 || question_length > MAX_QUESTION_CHARS {
        return Err(ValidationError::LengthOutOfRange {
            field: "question",
            max: MAX_QUESTION_CHARS,
        });
    }

    let answer_length = draft.answer.chars().count();
    if answer_length == 0 || answer_length > MAX_ANSWER_CHARS {
        return Err(ValidationError::LengthOutOfRange {
            field: "answer",
            max: MAX_ANSWER_CHARS,
        });
    }

    if !matches!(draft.difficulty.as_str(), "easy" | "medium" | "hard") {
        return Err(ValidationError::InvalidDifficulty);
    }

    if let Some(tags) = &draft.tags {
        if tags.len() > config.max_tags_per_flashcard {
            return Err(ValidationError::TooManyTags {
                max: config.max_tags_per_flashcard,
            });
        }
        for tag in tags {
            let tag_length = tag.chars().count();
            if tag_length == 0 || tag_length > config.max_tag_chars {
                return Err(ValidationError::TagLengthOutOfRange {
                    max: config.max_tag_chars,
                });
            }
        }
    }

    Ok(draft)
}

#[derive(Debug, Clone)]
pub struct FileUploadMeta {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Declared character length for text uploads; ignored for other types.
    pub text_chars: Option<usize>,
}

pub fn validate_file_upload(
    meta: &FileUploadMeta,
    config: &SecurityConfig,
) -> Result<(), ValidationError> {
    if !ALLOWED_UPLOAD_MIME_TYPES.contains(&meta.mime_type.as_str()) {
        return Err(ValidationError::UnsupportedFileType(meta.mime_type.clone()));
    }
    if meta.size_bytes > config.max_upload_bytes {
        return Err(ValidationError::FileTooLarge {
            max_bytes: config.max_upload_bytes,
        });
    }
    if meta.mime_type == "text/plain"
        && let Some(text_chars) = meta.text_chars
        && text_chars > config.max_text_upload_chars
    {
        return Err(ValidationError::TextUploadTooLong {
            max_chars: config.max_text_upload_chars,
        });
    }
    Ok(())
}

/// Walks a JSON document and sanitizes every string value. Arrays and objects
/// are descended into; non-string scalars pass through unchanged.
pub fn sanitize_json_value(value: &Value) -> Value {
    match value {
        Value::String(raw) => Value::String(sanitize_html(raw)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json_value).collect()),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), sanitize_json_value(entry)))
                .collect(),
        ),
        _ => value.clone(),
    }
}
