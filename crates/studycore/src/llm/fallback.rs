use super::content::{
    ContentKind, Diagram, DiagramComponent, DiagramConnection, DiagramDocument, DiagramKind,
    Difficulty, Flashcard, FlashcardSet, Formula, GeneratedContent, Importance, KeyPoint,
    MindMap, MindMapBranch, MindMapDocument, Notes, NotesDocument, QuizDocument, QuizQuestion,
    clamp_item_count,
};

/// Deterministic stand-in content for when the model's output cannot be
/// used. Total: every kind always yields a schema-valid document, so the
/// caller never surfaces an empty result. When the model produced text that
/// merely failed parsing, that text is preserved where the shape allows it.
pub fn synthesize(
    kind: ContentKind,
    topic: &str,
    difficulty: Difficulty,
    count: u32,
    raw_text: Option<&str>,
) -> GeneratedContent {
    let count = clamp_item_count(count);
    let salvaged = raw_text.map(str::trim).filter(|text| !text.is_empty());

    match kind {
        ContentKind::Flashcards => GeneratedContent::Flashcards(flashcards(topic, count)),
        ContentKind::Mindmaps => GeneratedContent::MindMap(mindmap(topic)),
        ContentKind::Quizzes => GeneratedContent::Quiz(quiz(topic, difficulty, count)),
        ContentKind::Diagrams => GeneratedContent::Diagram(diagram(topic, salvaged)),
        ContentKind::Notes => GeneratedContent::Notes(notes(topic, salvaged)),
    }
}

fn flashcards(topic: &str, count: usize) -> FlashcardSet {
    let flashcards = (1..=count)
        .map(|index| Flashcard {
            question: format!("Key concept {index}: what should you know about {topic}?"),
            answer: format!(
                "Review your course material on {topic} and write the answer in your own words."
            ),
            hint: Some(format!("Start from the definition of {topic}.")),
        })
        .collect();
    FlashcardSet { flashcards }
}

fn mindmap(topic: &str) -> MindMapDocument {
    MindMapDocument {
        mindmap: MindMap {
            central_topic: topic.to_string(),
            branches: vec![MindMapBranch {
                title: format!("Core ideas of {topic}"),
                subtopics: vec![
                    format!("Definitions and terminology for {topic}"),
                    format!("Worked examples involving {topic}"),
                ],
                details: format!(
                    "Automatic generation was unavailable; expand this branch with what you \
know about {topic}."
                ),
            }],
        },
    }
}

fn quiz(topic: &str, difficulty: Difficulty, count: usize) -> QuizDocument {
    let quiz = (1..=count)
        .map(|index| QuizQuestion {
            question: format!(
                "Practice question {index} ({difficulty}): which statement about {topic} is most accurate?",
                difficulty = difficulty.as_str(),
            ),
            options: vec![
                format!("A statement you believe is true of {topic}"),
                "A common misconception".to_string(),
                "An unrelated fact".to_string(),
                "None of the above".to_string(),
            ],
            correct_answer: 0,
            explanation: format!(
                "Automatic generation was unavailable; verify the answer against your notes on {topic}."
            ),
        })
        .collect();
    QuizDocument { quiz }
}

fn diagram(topic: &str, salvaged: Option<&str>) -> DiagramDocument {
    let description = salvaged
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Sketch how the parts of {topic} relate to each other."));
    DiagramDocument {
        diagram: Diagram {
            title: format!("Overview of {topic}"),
            kind: DiagramKind::Concept,
            components: vec![DiagramComponent {
                id: "topic".to_string(),
                label: topic.to_string(),
                description,
            }],
            connections: Vec::<DiagramConnection>::new(),
        },
    }
}

fn notes(topic: &str, salvaged: Option<&str>) -> NotesDocument {
    let summary = salvaged
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Automatic notes for {topic} were unavailable."));
    NotesDocument {
        notes: Notes {
            title: format!("Study notes: {topic}"),
            summary,
            key_points: vec![KeyPoint {
                heading: format!("Review {topic}"),
                content: format!(
                    "Collect the main definitions, results, and examples for {topic} from your \
course material."
                ),
                importance: Importance::High,
            }],
            formulas: Vec::<Formula>::new(),
            quick_facts: vec![format!("Generated offline for {topic}.")],
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::llm::content::{ContentKind, Difficulty, GeneratedContent, parse_content};

    use super::synthesize;

    #[test]
    fn every_kind_synthesizes_schema_valid_content() {
        for count in 1..=20 {
            for kind in ContentKind::ALL {
                let content = synthesize(kind, "osmosis", Difficulty::Medium, count, None);
                assert_eq!(content.kind(), kind);

                match &content {
                    GeneratedContent::Flashcards(set) => {
                        assert_eq!(set.flashcards.len(), count as usize);
                    }
                    GeneratedContent::Quiz(doc) => {
                        assert_eq!(doc.quiz.len(), count as usize);
                    }
                    _ => {}
                }

                let value = serde_json::to_value(&content).expect("content serializes");
                parse_content(kind, &value)
                    .expect("synthesized content must satisfy its own schema");
            }
        }
    }

    #[test]
    fn item_counts_are_clamped() {
        let GeneratedContent::Flashcards(set) =
            synthesize(ContentKind::Flashcards, "osmosis", Difficulty::Easy, 0, None)
        else {
            panic!("expected flashcards");
        };
        assert_eq!(set.flashcards.len(), 1);

        let GeneratedContent::Quiz(doc) =
            synthesize(ContentKind::Quizzes, "osmosis", Difficulty::Easy, 99, None)
        else {
            panic!("expected quiz");
        };
        assert_eq!(doc.quiz.len(), 20);
    }

    #[test]
    fn topic_appears_in_synthesized_items() {
        let GeneratedContent::Flashcards(set) =
            synthesize(ContentKind::Flashcards, "the Treaty of Westphalia", Difficulty::Hard, 2, None)
        else {
            panic!("expected flashcards");
        };
        for card in &set.flashcards {
            assert!(card.question.contains("the Treaty of Westphalia"));
        }
    }

    #[test]
    fn unusable_model_text_is_preserved_in_notes() {
        let GeneratedContent::Notes(doc) = synthesize(
            ContentKind::Notes,
            "osmosis",
            Difficulty::Medium,
            1,
            Some("  Water moves across membranes toward higher solute concentration.  "),
        ) else {
            panic!("expected notes");
        };
        assert_eq!(
            doc.notes.summary,
            "Water moves across membranes toward higher solute concentration."
        );
    }

    #[test]
    fn blank_model_text_is_treated_as_absent() {
        let GeneratedContent::Notes(doc) =
            synthesize(ContentKind::Notes, "osmosis", Difficulty::Medium, 1, Some("   "))
        else {
            panic!("expected notes");
        };
        assert!(doc.notes.summary.contains("unavailable"));
    }
}
