use serde_json::Value;

use super::content::{ContentError, ContentKind, GeneratedContent, parse_content};

/// Pulls a JSON document out of free-form model output. Prefers a fenced
/// json block; otherwise takes the first balanced top-level object,
/// tracking string and escape state so braces inside strings do not count.
pub fn extract_json_block(text: &str) -> Option<String> {
    if let Some(fenced) = extract_fenced_json(text) {
        return Some(fenced);
    }
    extract_balanced_object(text)
}

/// Parses raw model output into typed content: extracted block first, then
/// the whole trimmed text as a last resort.
pub fn parse_generated(kind: ContentKind, raw: &str) -> Result<GeneratedContent, ContentError> {
    let candidate = extract_json_block(raw).unwrap_or_else(|| raw.trim().to_string());
    let value: Value = serde_json::from_str(&candidate)?;
    parse_content(kind, &value)
}

fn extract_fenced_json(text: &str) -> Option<String> {
    let after_open = text.split_once("```json").map(|(_, rest)| rest)?;
    let inner = after_open.split_once("```").map(|(inner, _)| inner)?;
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn extract_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use crate::llm::content::{ContentKind, GeneratedContent};

    use super::{extract_json_block, parse_generated};

    #[test]
    fn fenced_block_wins_over_surrounding_prose() {
        let raw = "Here you go!\n```json\n{\"flashcards\": []}\n```\nHope that helps.";
        assert_eq!(
            extract_json_block(raw).as_deref(),
            Some("{\"flashcards\": []}")
        );
    }

    #[test]
    fn bare_object_is_extracted_from_prose() {
        let raw = "Sure: {\"quiz\": []} as requested.";
        assert_eq!(extract_json_block(raw).as_deref(), Some("{\"quiz\": []}"));
    }

    #[test]
    fn braces_inside_strings_do_not_break_balancing() {
        let raw = r#"{"notes": "a } inside", "more": {"x": 1}} trailing"#;
        assert_eq!(
            extract_json_block(raw).as_deref(),
            Some(r#"{"notes": "a } inside", "more": {"x": 1}}"#)
        );
    }

    #[test]
    fn escaped_quotes_are_tracked() {
        let raw = r#"{"q": "she said \"}\" loudly"}"#;
        assert_eq!(extract_json_block(raw).as_deref(), Some(raw));
    }

    #[test]
    fn text_without_json_yields_nothing() {
        assert_eq!(extract_json_block("no structured output here"), None);
    }

    #[test]
    fn parse_generated_accepts_a_chatty_but_valid_reply() {
        let raw = concat!(
            "Here are your flashcards:\n",
            "```json\n",
            r#"{"flashcards": [{"question": "Q", "answer": "A"}]}"#,
            "\n```"
        );
        let parsed =
            parse_generated(ContentKind::Flashcards, raw).expect("valid reply should parse");
        assert!(matches!(parsed, GeneratedContent::Flashcards(_)));
    }

    #[test]
    fn parse_generated_rejects_schema_violations() {
        let raw = r#"{"flashcards": [{"question": "Q"}]}"#;
        assert!(parse_generated(ContentKind::Flashcards, raw).is_err());
    }

    #[test]
    fn parse_generated_rejects_non_json() {
        assert!(parse_generated(ContentKind::Flashcards, "I refuse to answer.").is_err());
    }
}
