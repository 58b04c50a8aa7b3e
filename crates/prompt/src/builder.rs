//! Prompt builder for rendering answer templates.

use crate::types::{AnswerPromptInput, BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use handlebars::Handlebars;
use medrag_core::{AppError, AppResult};
use serde::Serialize;

/// Build a prompt from a definition and the turn's question, passages and history.
///
/// # Example
/// ```no_run
/// use medrag_prompt::{answer_prompt, build_prompt, AnswerPromptInput};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let input = AnswerPromptInput {
///     question: "Adult dose of amoxicillin?".to_string(),
///     ..Default::default()
/// };
/// let built = build_prompt(&answer_prompt(), &input)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    input: &AnswerPromptInput,
) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        prompt_id = %definition.id,
        passages = input.passages.len(),
        history = input.history.len(),
        "Building prompt"
    );

    let user = render_template(&definition.template, input)?;
    let system = Some(definition.system.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            passage_count: input.passages.len(),
            history_turns: input.history.len(),
        },
    })
}

/// Render a Handlebars template with variables.
fn render_template<T: Serialize>(template: &str, data: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Passages are plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::answer_prompt;
    use crate::types::{PromptHistoryTurn, PromptPassage};

    fn passage(number: usize, source: &str, section: Option<&str>, text: &str) -> PromptPassage {
        PromptPassage {
            number,
            source: source.to_string(),
            section: section.map(str::to_string),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_render_simple_template() {
        let data = serde_json::json!({"question": "Hello, world!"});
        let result = render_template("Question: {{question}}", &data).unwrap();
        assert_eq!(result, "Question: Hello, world!");
    }

    #[test]
    fn test_build_answer_prompt_numbers_passages() {
        let input = AnswerPromptInput {
            question: "Adult dose of amoxicillin for pneumonia?".to_string(),
            passages: vec![
                passage(1, "respiratory.pdf", Some("Pneumonia"), "Amoxicillin 1 g three times daily."),
                passage(2, "antibiotics.pdf", None, "Adjust in renal impairment."),
            ],
            history: Vec::new(),
        };

        let built = build_prompt(&answer_prompt(), &input).unwrap();
        assert!(built.user.contains("[1] respiratory.pdf (Pneumonia)"));
        assert!(built.user.contains("Amoxicillin 1 g three times daily."));
        assert!(built.user.contains("[2] antibiotics.pdf"));
        assert!(built.user.contains("Question: Adult dose of amoxicillin for pneumonia?"));
        assert!(!built.user.contains("Conversation so far"));
        assert!(built.system.is_some());
        assert_eq!(built.metadata.source_prompt_id, "medrag.answer.v1");
        assert_eq!(built.metadata.passage_count, 2);
    }

    #[test]
    fn test_build_answer_prompt_with_history() {
        let input = AnswerPromptInput {
            question: "And for children?".to_string(),
            passages: vec![passage(1, "respiratory.pdf", None, "40 mg/kg/day.")],
            history: vec![PromptHistoryTurn {
                question: "Adult dose?".to_string(),
                answer: "1 g three times daily [1].".to_string(),
            }],
        };

        let built = build_prompt(&answer_prompt(), &input).unwrap();
        assert!(built.user.contains("Conversation so far"));
        assert!(built.user.contains("Q: Adult dose?"));
        assert_eq!(built.metadata.history_turns, 1);
    }

    #[test]
    fn test_passage_text_is_not_escaped() {
        let input = AnswerPromptInput {
            question: "q".to_string(),
            passages: vec![passage(1, "a.pdf", None, "CrCl < 30 mL/min & dialysis")],
            history: Vec::new(),
        };
        let built = build_prompt(&answer_prompt(), &input).unwrap();
        assert!(built.user.contains("CrCl < 30 mL/min & dialysis"));
    }

    #[test]
    fn test_invalid_template_is_prompt_error() {
        let mut def = answer_prompt();
        def.template = "{{#each passages}}unterminated".to_string();
        let result = build_prompt(&def, &AnswerPromptInput::default());
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }
}
