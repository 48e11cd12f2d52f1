use std::sync::LazyLock;

use jsonschema::JSONSchema;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MIN_CONTENT_ITEMS: u32 = 1;
pub const MAX_CONTENT_ITEMS: u32 = 20;

/// The five generated-content kinds. Anything else a caller sends is clamped
/// to flashcards rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Flashcards,
    Mindmaps,
    Quizzes,
    Diagrams,
    Notes,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        Self::Flashcards,
        Self::Mindmaps,
        Self::Quizzes,
        Self::Diagrams,
        Self::Notes,
    ];

    pub fn from_request(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mindmaps" => Self::Mindmaps,
            "quizzes" => Self::Quizzes,
            "diagrams" => Self::Diagrams,
            "notes" => Self::Notes,
            _ => Self::Flashcards,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flashcards => "flashcards",
            Self::Mindmaps => "mindmaps",
            Self::Quizzes => "quizzes",
            Self::Diagrams => "diagrams",
            Self::Notes => "notes",
        }
    }
}

/// Unknown difficulty values clamp to medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_request(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

pub fn clamp_item_count(requested: u32) -> usize {
    requested.clamp(MIN_CONTENT_ITEMS, MAX_CONTENT_ITEMS) as usize
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FlashcardSet {
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MindMapDocument {
    pub mindmap: MindMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MindMap {
    pub central_topic: String,
    pub branches: Vec<MindMapBranch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MindMapBranch {
    pub title: String,
    pub subtopics: Vec<String>,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QuizDocument {
    pub quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QuizQuestion {
    pub question: String,
    #[schemars(length(min = 4, max = 4))]
    pub options: Vec<String>,
    #[schemars(range(min = 0, max = 3))]
    pub correct_answer: u8,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DiagramDocument {
    pub diagram: Diagram,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Diagram {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: DiagramKind,
    pub components: Vec<DiagramComponent>,
    pub connections: Vec<DiagramConnection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    Flowchart,
    Hierarchy,
    Process,
    Concept,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DiagramComponent {
    pub id: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DiagramConnection {
    pub from: String,
    pub to: String,
    pub relationship: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NotesDocument {
    pub notes: Notes,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Notes {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<KeyPoint>,
    pub formulas: Vec<Formula>,
    pub quick_facts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct KeyPoint {
    pub heading: String,
    pub content: String,
    pub importance: Importance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Formula {
    pub name: String,
    pub formula: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratedContent {
    Flashcards(FlashcardSet),
    MindMap(MindMapDocument),
    Quiz(QuizDocument),
    Diagram(DiagramDocument),
    Notes(NotesDocument),
}

impl GeneratedContent {
    pub const fn kind(&self) -> ContentKind {
        match self {
            Self::Flashcards(_) => ContentKind::Flashcards,
            Self::MindMap(_) => ContentKind::Mindmaps,
            Self::Quiz(_) => ContentKind::Quizzes,
            Self::Diagram(_) => ContentKind::Diagrams,
            Self::Notes(_) => ContentKind::Notes,
        }
    }
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("generated content is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("content schema for {kind:?} failed to compile: {message}")]
    SchemaCompile { kind: ContentKind, message: String },
    #[error("generated content failed schema validation for {kind:?}: {errors:?}")]
    SchemaViolation {
        kind: ContentKind,
        errors: Vec<String>,
    },
}

pub fn content_schema(kind: ContentKind) -> Value {
    match kind {
        ContentKind::Flashcards => serde_json::to_value(schema_for!(FlashcardSet))
            .expect("flashcard schema should be serializable"),
        ContentKind::Mindmaps => serde_json::to_value(schema_for!(MindMapDocument))
            .expect("mindmap schema should be serializable"),
        ContentKind::Quizzes => serde_json::to_value(schema_for!(QuizDocument))
            .expect("quiz schema should be serializable"),
        ContentKind::Diagrams => serde_json::to_value(schema_for!(DiagramDocument))
            .expect("diagram schema should be serializable"),
        ContentKind::Notes => serde_json::to_value(schema_for!(NotesDocument))
            .expect("notes schema should be serializable"),
    }
}

/// Validates a candidate document against the kind's schema, then
/// deserializes it into the typed shape.
pub fn parse_content(kind: ContentKind, payload: &Value) -> Result<GeneratedContent, ContentError> {
    let validator = validator_for_kind(kind)?;

    if let Err(validation_errors) = validator.validate(payload) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(ContentError::SchemaViolation { kind, errors });
    }

    let parsed = match kind {
        ContentKind::Flashcards => {
            GeneratedContent::Flashcards(serde_json::from_value(payload.clone())?)
        }
        ContentKind::Mindmaps => {
            GeneratedContent::MindMap(serde_json::from_value(payload.clone())?)
        }
        ContentKind::Quizzes => GeneratedContent::Quiz(serde_json::from_value(payload.clone())?),
        ContentKind::Diagrams => {
            GeneratedContent::Diagram(serde_json::from_value(payload.clone())?)
        }
        ContentKind::Notes => GeneratedContent::Notes(serde_json::from_value(payload.clone())?),
    };
    Ok(parsed)
}

static FLASHCARDS_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&content_schema(ContentKind::Flashcards)).map_err(|err| err.to_string())
});

static MINDMAPS_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&content_schema(ContentKind::Mindmaps)).map_err(|err| err.to_string())
});

static QUIZZES_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&content_schema(ContentKind::Quizzes)).map_err(|err| err.to_string())
});

static DIAGRAMS_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&content_schema(ContentKind::Diagrams)).map_err(|err| err.to_string())
});

static NOTES_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&content_schema(ContentKind::Notes)).map_err(|err| err.to_string())
});

fn validator_for_kind(kind: ContentKind) -> Result<&'static JSONSchema, ContentError> {
    let validator_result = match kind {
        ContentKind::Flashcards => &*FLASHCARDS_VALIDATOR,
        ContentKind::Mindmaps => &*MINDMAPS_VALIDATOR,
        ContentKind::Quizzes => &*QUIZZES_VALIDATOR,
        ContentKind::Diagrams => &*DIAGRAMS_VALIDATOR,
        ContentKind::Notes => &*NOTES_VALIDATOR,
    };

    validator_result
        .as_ref()
        .map_err(|message| ContentError::SchemaCompile {
            kind,
            message: message.clone(),
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        ContentError, ContentKind, Difficulty, GeneratedContent, clamp_item_count, parse_content,
    };

    #[test]
    fn unknown_kind_and_difficulty_clamp_to_defaults() {
        assert_eq!(ContentKind::from_request("podcasts"), ContentKind::Flashcards);
        assert_eq!(ContentKind::from_request(" Quizzes "), ContentKind::Quizzes);
        assert_eq!(Difficulty::from_request("brutal"), Difficulty::Medium);
        assert_eq!(Difficulty::from_request("EASY"), Difficulty::Easy);
    }

    #[test]
    fn item_count_clamps_to_valid_range() {
        assert_eq!(clamp_item_count(0), 1);
        assert_eq!(clamp_item_count(7), 7);
        assert_eq!(clamp_item_count(500), 20);
    }

    #[test]
    fn valid_flashcard_payload_parses() {
        let payload = json!({
            "flashcards": [
                { "question": "What is ATP?", "answer": "The cell's energy currency.", "hint": "Think energy." },
                { "question": "Where is it made?", "answer": "Mostly in mitochondria." }
            ]
        });

        let parsed = parse_content(ContentKind::Flashcards, &payload)
            .expect("valid flashcard payload should parse");
        let GeneratedContent::Flashcards(set) = parsed else {
            panic!("expected flashcards");
        };
        assert_eq!(set.flashcards.len(), 2);
        assert!(set.flashcards[1].hint.is_none());
    }

    #[test]
    fn quiz_payload_with_wrong_option_count_is_rejected() {
        let payload = json!({
            "quiz": [
                {
                    "question": "Pick one",
                    "options": ["a", "b"],
                    "correct_answer": 0,
                    "explanation": "because"
                }
            ]
        });

        let err = parse_content(ContentKind::Quizzes, &payload)
            .expect_err("two options must fail the four-option schema");
        assert!(matches!(err, ContentError::SchemaViolation { .. }));
    }

    #[test]
    fn quiz_answer_index_out_of_range_is_rejected() {
        let payload = json!({
            "quiz": [
                {
                    "question": "Pick one",
                    "options": ["a", "b", "c", "d"],
                    "correct_answer": 4,
                    "explanation": "because"
                }
            ]
        });

        assert!(parse_content(ContentKind::Quizzes, &payload).is_err());
    }

    #[test]
    fn payload_of_the_wrong_kind_is_rejected() {
        let payload = json!({
            "flashcards": [
                { "question": "Q", "answer": "A" }
            ]
        });

        let err = parse_content(ContentKind::Notes, &payload)
            .expect_err("flashcard payload should not satisfy the notes schema");
        assert!(matches!(err, ContentError::SchemaViolation { .. }));
    }

    #[test]
    fn diagram_type_values_are_constrained() {
        let payload = json!({
            "diagram": {
                "title": "Water cycle",
                "type": "spiral",
                "components": [],
                "connections": []
            }
        });

        assert!(parse_content(ContentKind::Diagrams, &payload).is_err());
    }
}
