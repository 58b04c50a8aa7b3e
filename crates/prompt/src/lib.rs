//! Prompt system for medrag.
//!
//! Answer prompts are versioned YAML definitions rendered with Handlebars.
//! A built-in definition ships with the binary; a workspace can override it
//! by placing `<id>.yml` under `.medrag/prompts/`.

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use builtin::{answer_prompt, ANSWER_PROMPT_ID};
pub use loader::{list_prompts, load_prompt, resolve_prompt};
pub use types::{
    AnswerPromptInput, BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptHistoryTurn,
    PromptPassage,
};
