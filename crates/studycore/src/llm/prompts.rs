use super::content::{ContentKind, Difficulty};

/// System and user halves of an outbound model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

const GENERATION_SYSTEM_PROMPT: &str = "You are a study content generator for students. \
You produce a single JSON document and nothing else: no markdown fences, no prose before \
or after the JSON. The document must match the requested structure exactly.";

const CHAT_SYSTEM_PROMPT: &str = "You are a patient study tutor. Answer the student's \
questions clearly and accurately, show working where it helps, and keep answers focused \
on the study topic at hand.";

/// Builds the full generation prompt for one content request. The topic is
/// embedded verbatim in five numbered constraints so the model cannot drift
/// onto adjacent subjects.
pub fn build_generation_prompt(
    kind: ContentKind,
    topic: &str,
    difficulty: Difficulty,
    count: usize,
    subject: Option<&str>,
) -> GenerationPrompt {
    let subject_line = match subject {
        Some(subject) => format!("The student is studying {subject}.\n"),
        None => String::new(),
    };

    let user_prompt = format!(
        "{subject_line}Generate {count} {kind} item(s) about \"{topic}\" at {difficulty} difficulty.\n\
\n\
Follow every constraint:\n\
1. Every item must be specifically about \"{topic}\", not the broader subject area.\n\
2. Do not substitute a related or more general topic for \"{topic}\".\n\
3. If \"{topic}\" is narrow, go deeper into \"{topic}\" rather than wider.\n\
4. Factual claims must be accurate for \"{topic}\" as commonly taught.\n\
5. Match the {difficulty} difficulty level in depth and vocabulary.\n\
\n\
Respond with exactly this JSON structure:\n\
{template}",
        kind = kind.as_str(),
        difficulty = difficulty.as_str(),
        template = json_template(kind),
    );

    GenerationPrompt {
        system_prompt: GENERATION_SYSTEM_PROMPT.to_string(),
        user_prompt,
    }
}

pub fn build_chat_prompt(subject: Option<&str>) -> String {
    match subject {
        Some(subject) => format!("{CHAT_SYSTEM_PROMPT} The current subject is {subject}."),
        None => CHAT_SYSTEM_PROMPT.to_string(),
    }
}

fn json_template(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Flashcards => {
            r#"{
  "flashcards": [
    { "question": "...", "answer": "...", "hint": "..." }
  ]
}"#
        }
        ContentKind::Mindmaps => {
            r#"{
  "mindmap": {
    "central_topic": "...",
    "branches": [
      { "title": "...", "subtopics": ["..."], "details": "..." }
    ]
  }
}"#
        }
        ContentKind::Quizzes => {
            r#"{
  "quiz": [
    {
      "question": "...",
      "options": ["...", "...", "...", "..."],
      "correct_answer": 0,
      "explanation": "..."
    }
  ]
}"#
        }
        ContentKind::Diagrams => {
            r#"{
  "diagram": {
    "title": "...",
    "type": "flowchart",
    "components": [
      { "id": "...", "label": "...", "description": "..." }
    ],
    "connections": [
      { "from": "...", "to": "...", "relationship": "..." }
    ]
  }
}"#
        }
        ContentKind::Notes => {
            r#"{
  "notes": {
    "title": "...",
    "summary": "...",
    "key_points": [
      { "heading": "...", "content": "...", "importance": "high" }
    ],
    "formulas": [
      { "name": "...", "formula": "...", "explanation": "..." }
    ],
    "quick_facts": ["..."]
  }
}"#
        }
    }
}
