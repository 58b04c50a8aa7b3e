//! Grounded answer composition over retrieved passages.

use super::citations::extract_citations;
use super::types::{AnswerFragment, Query, Turn};
use crate::types::RetrievalResult;
use futures::{Stream, StreamExt};
use medrag_core::{AppError, AppResult};
use medrag_llm::{GenerationOptions, LlmClient, LlmRequest, LlmStream, LlmUsage};
use medrag_prompt::{
    build_prompt, AnswerPromptInput, PromptDefinition, PromptHistoryTurn, PromptPassage,
};
use std::pin::Pin;
use std::sync::Arc;

/// Earlier turns rendered into the answer prompt.
const PROMPT_HISTORY_TURNS: usize = 3;

/// Lazy stream of answer fragments, closed by [`AnswerFragment::Final`] or an error.
pub type FragmentStream = Pin<Box<dyn Stream<Item = AppResult<AnswerFragment>> + Send>>;

/// Turns a question and its retrieved context into a streamed, cited answer.
#[derive(Clone)]
pub struct AnswerComposer {
    llm: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    options: GenerationOptions,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmClient>, prompt: PromptDefinition, options: GenerationOptions) -> Self {
        Self {
            llm,
            prompt,
            options,
        }
    }

    /// Versioned id of the answer prompt.
    pub fn prompt_id(&self) -> &str {
        &self.prompt.id
    }

    /// Compose an answer for a single question.
    pub fn compose(&self, query: &Query, context: &RetrievalResult) -> AppResult<FragmentStream> {
        self.compose_with_history(query, context, &[])
    }

    /// Compose an answer with the conversation so far in the prompt.
    ///
    /// Fails with [`AppError::Grounding`] on empty context and
    /// [`AppError::Prompt`] on a broken template, both before any generation
    /// starts. The model is only called once the stream is first polled.
    pub fn compose_with_history(
        &self,
        query: &Query,
        context: &RetrievalResult,
        history: &[Turn],
    ) -> AppResult<FragmentStream> {
        if context.is_empty() {
            return Err(AppError::Grounding(
                "no relevant guideline passages were found for this question".to_string(),
            ));
        }

        let request = self.build_request(query, context, history)?;
        let generation = Generation {
            context: context.clone(),
            text: String::new(),
            usage: None,
            state: GenerationState::Pending(Arc::clone(&self.llm), request),
        };

        Ok(Box::pin(futures::stream::unfold(generation, |mut g| async move {
            let item = g.advance().await?;
            Some((item, g))
        })))
    }

    fn build_request(
        &self,
        query: &Query,
        context: &RetrievalResult,
        history: &[Turn],
    ) -> AppResult<LlmRequest> {
        let passages = context
            .iter()
            .enumerate()
            .map(|(i, scored)| PromptPassage {
                number: i + 1,
                source: scored.chunk.source_document.clone(),
                section: scored.chunk.section.clone(),
                text: scored.chunk.text.clone(),
            })
            .collect();

        let start = history.len().saturating_sub(PROMPT_HISTORY_TURNS);
        let history = history[start..]
            .iter()
            .map(|turn| PromptHistoryTurn {
                question: turn.query.text.clone(),
                answer: turn.answer.text.clone(),
            })
            .collect();

        let input = AnswerPromptInput {
            question: query.text.clone(),
            passages,
            history,
        };
        let built = build_prompt(&self.prompt, &input)?;

        tracing::debug!(
            "Built prompt '{}' with {} passages and {} history turns",
            built.metadata.source_prompt_id,
            built.metadata.passage_count,
            built.metadata.history_turns
        );

        let mut request = LlmRequest::from_options(built.user, &self.options).with_streaming();
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        Ok(request)
    }
}

enum GenerationState {
    Pending(Arc<dyn LlmClient>, LlmRequest),
    Streaming(LlmStream),
    Finishing,
    Done,
}

struct Generation {
    context: RetrievalResult,
    text: String,
    usage: Option<LlmUsage>,
    state: GenerationState,
}

impl Generation {
    /// Next item of the fragment stream, or `None` once it has ended.
    async fn advance(&mut self) -> Option<AppResult<AnswerFragment>> {
        loop {
            match std::mem::replace(&mut self.state, GenerationState::Done) {
                GenerationState::Done => return None,

                GenerationState::Pending(llm, request) => match llm.stream(&request).await {
                    Ok(inner) => self.state = GenerationState::Streaming(inner),
                    Err(e) => {
                        return Some(Err(AppError::Generation(format!(
                            "language model unavailable: {}",
                            e
                        ))))
                    }
                },

                GenerationState::Streaming(mut inner) => match inner.next().await {
                    Some(Ok(chunk)) => {
                        if chunk.usage.is_some() {
                            self.usage = chunk.usage;
                        }
                        self.state = if chunk.done {
                            GenerationState::Finishing
                        } else {
                            GenerationState::Streaming(inner)
                        };
                        if !chunk.content.is_empty() {
                            self.text.push_str(&chunk.content);
                            return Some(Ok(AnswerFragment::text(chunk.content)));
                        }
                    }
                    Some(Err(e)) => {
                        return Some(Err(AppError::Generation(format!(
                            "generation interrupted: {}",
                            e
                        ))))
                    }
                    None => self.state = GenerationState::Finishing,
                },

                GenerationState::Finishing => return Some(self.finish()),
            }
        }
    }

    fn finish(&self) -> AppResult<AnswerFragment> {
        if self.text.trim().is_empty() {
            return Err(AppError::Generation(
                "language model returned an empty answer".to_string(),
            ));
        }

        Ok(AnswerFragment::Final {
            citations: extract_citations(&self.text, &self.context),
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{scored, ScriptedLlm};
    use futures::TryStreamExt;
    use medrag_prompt::answer_prompt;

    fn composer(llm: ScriptedLlm) -> AnswerComposer {
        AnswerComposer::new(
            Arc::new(llm),
            answer_prompt(),
            GenerationOptions::for_model("test-model"),
        )
    }

    #[tokio::test]
    async fn test_empty_context_is_grounding_error() {
        let llm = ScriptedLlm::new(vec!["unused"]);
        let calls = llm.calls();
        let result = composer(llm).compose(&Query::new("c", "dose?"), &Vec::new());

        assert!(matches!(result, Err(AppError::Grounding(_))));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fragments_then_final_with_citations() {
        let context = vec![scored("a", 0.9), scored("b", 0.8)];
        let stream = composer(ScriptedLlm::new(vec!["Give ", "ACT [2]."]))
            .compose(&Query::new("c", "treatment?"), &context)
            .unwrap();
        let fragments: Vec<AnswerFragment> = stream.try_collect().await.unwrap();

        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0], AnswerFragment::text("Give "));
        match &fragments[2] {
            AnswerFragment::Final { citations, usage } => {
                assert_eq!(citations.len(), 1);
                assert_eq!(citations[0].chunk_id, "b");
                assert!(usage.is_some());
            }
            other => panic!("expected final fragment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_unavailable_is_generation_error() {
        let context = vec![scored("a", 0.9)];
        let mut stream = composer(ScriptedLlm::unavailable())
            .compose(&Query::new("c", "dose?"), &context)
            .unwrap();

        assert!(matches!(
            stream.next().await,
            Some(Err(AppError::Generation(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_mid_stream_is_generation_error() {
        let context = vec![scored("a", 0.9)];
        let mut stream = composer(ScriptedLlm::new(vec!["Give "]).failing_after(1))
            .compose(&Query::new("c", "dose?"), &context)
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), AnswerFragment::text("Give "));
        assert!(matches!(
            stream.next().await,
            Some(Err(AppError::Generation(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_generation_is_error() {
        let context = vec![scored("a", 0.9)];
        let stream = composer(ScriptedLlm::new(Vec::new()))
            .compose(&Query::new("c", "dose?"), &context)
            .unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(AppError::Generation(_))));
    }
}
