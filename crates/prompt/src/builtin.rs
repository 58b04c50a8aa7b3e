//! Built-in prompt definitions.

use crate::types::PromptDefinition;

/// Identifier of the default answer prompt.
pub const ANSWER_PROMPT_ID: &str = "medrag.answer.v1";

const ANSWER_SYSTEM: &str = "You are a clinical guidelines assistant. Answer the question using \
only the numbered context passages. Cite every passage you rely on with its marker, for \
example [1] or [2][3]. If the passages do not contain the answer, say that the guidelines \
provided do not cover it. Do not invent dosages, drug names or recommendations.";

const ANSWER_TEMPLATE: &str = "{{#if history}}Conversation so far:
{{#each history}}Q: {{this.question}}
A: {{this.answer}}
{{/each}}
{{/if}}Context passages:
{{#each passages}}[{{this.number}}] {{this.source}}{{#if this.section}} ({{this.section}}){{/if}}
{{this.text}}

{{/each}}Question: {{question}}
Answer:";

/// The built-in grounded answer prompt.
pub fn answer_prompt() -> PromptDefinition {
    PromptDefinition {
        id: ANSWER_PROMPT_ID.to_string(),
        title: "Grounded guideline answer".to_string(),
        api_version: "1.0".to_string(),
        created_by: "medrag".to_string(),
        system: ANSWER_SYSTEM.to_string(),
        template: ANSWER_TEMPLATE.to_string(),
    }
}
