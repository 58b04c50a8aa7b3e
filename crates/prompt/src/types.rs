//! Prompt types.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique, versioned prompt identifier (e.g. `medrag.answer.v1`)
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// System instructions sent alongside the rendered template
    pub system: String,

    /// User-turn template with Handlebars syntax
    pub template: String,
}

/// One numbered context passage offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPassage {
    /// 1-based marker the model cites as `[number]`
    pub number: usize,

    /// Source document label
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    pub text: String,
}

/// A completed exchange from earlier in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptHistoryTurn {
    pub question: String,
    pub answer: String,
}

/// Variables available to answer templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerPromptInput {
    pub question: String,
    pub passages: Vec<PromptPassage>,
    #[serde(default)]
    pub history: Vec<PromptHistoryTurn>,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID, recorded with each turn's metrics
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Number of context passages rendered
    #[serde(rename = "passageCount")]
    pub passage_count: usize,

    /// Number of history turns rendered
    #[serde(rename = "historyTurns")]
    pub history_turns: usize,
}
