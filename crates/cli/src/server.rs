//! HTTP interface for chat front ends.
//!
//! Turns are streamed as server-sent events: `fragment` events carry answer
//! text, then a single `completed` event carries the citations, or an
//! `error` event ends the stream. Closing the connection cancels the turn.
//! Conversations stay in memory until deleted; `/ask` without a
//! conversation id answers in a one-off conversation that is dropped again.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use medrag_core::{AppError, AppResult};
use medrag_knowledge::{AnswerFragment, Citation, SessionOrchestrator, Turn, TurnPhase};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

/// `/ask` input, from the JSON body or the query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    #[serde(default)]
    pub query: Option<String>,
    /// Continue an existing conversation instead of a one-off one
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub phase: TurnPhase,
    pub turns: Vec<Turn>,
}

/// Error response with a machine-readable kind.
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    App(AppError),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::App(err) => {
                let status = match &err {
                    AppError::Grounding(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    AppError::Retrieval(_) => StatusCode::SERVICE_UNAVAILABLE,
                    AppError::Generation(_) | AppError::Llm(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind(), err.to_string())
            }
        };

        (
            status,
            Json(serde_json::json!({ "kind": kind, "error": message })),
        )
            .into_response()
    }
}

pub fn router(orchestrator: Arc<SessionOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ask", post(ask))
        .route("/api/conversations", post(create_conversation))
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(end_conversation),
        )
        .route("/api/conversations/:id/turns", post(submit_turn))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { orchestrator })
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, orchestrator: Arc<SessionOrchestrator>) -> AppResult<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
        AppError::from(e)
    })?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "medrag",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn create_conversation(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.orchestrator.create_conversation();
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "conversationId": id })),
    )
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let turns = state
        .orchestrator
        .history(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", id)))?;
    let phase = state.orchestrator.phase(&id).unwrap_or_default();

    Ok(Json(ConversationResponse {
        conversation_id: id,
        phase,
        turns,
    }))
}

async fn end_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.orchestrator.end_conversation(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Conversation {} not found", id)))
    }
}

async fn submit_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    // Conversations are created explicitly over HTTP
    if state.orchestrator.history(&id).is_none() {
        return Err(ApiError::NotFound(format!("Conversation {} not found", id)));
    }

    let events = state
        .orchestrator
        .submit_turn(&id, text)
        .map(|item| to_event(&item));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn ask(
    State(state): State<AppState>,
    Query(params): Query<AskRequest>,
    body: Option<Json<AskRequest>>,
) -> Result<Json<AskResponse>, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let query = body.query.or(params.query).unwrap_or_default();
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let (answer, conversation_id) = match body.conversation_id.or(params.conversation_id) {
        Some(id) => {
            let answer = state.orchestrator.answer(&id, query).await;
            (answer, Some(id))
        }
        None => {
            let id = state.orchestrator.create_conversation();
            let answer = state.orchestrator.answer(&id, query).await;
            state.orchestrator.end_conversation(&id);
            (answer, None)
        }
    };
    let answer = answer?;

    Ok(Json(AskResponse {
        answer: answer.text,
        citations: answer.citations,
        conversation_id,
    }))
}

fn to_event(item: &AppResult<AnswerFragment>) -> Result<Event, axum::Error> {
    match item {
        Ok(AnswerFragment::Text { text }) => Event::default()
            .event("fragment")
            .json_data(serde_json::json!({ "text": text })),
        Ok(AnswerFragment::Final { citations, usage }) => Event::default()
            .event("completed")
            .json_data(serde_json::json!({ "citations": citations, "usage": usage })),
        Err(err) => Event::default().event("error").json_data(serde_json::json!({
            "kind": err.kind(),
            "error": err.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrag_knowledge::embeddings::providers::TrigramProvider;
    use medrag_knowledge::{
        AnswerComposer, DocumentChunk, EmbeddingProvider, MemoryStore, Retriever,
    };
    use medrag_llm::{
        GenerationOptions, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk,
        LlmUsage,
    };

    struct EchoLlm;

    #[async_trait::async_trait]
    impl LlmClient for EchoLlm {
        fn provider_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            Ok(LlmResponse {
                content: "Give ACT [1].".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
            })
        }

        async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
            Ok(Box::pin(futures::stream::iter(vec![
                Ok(LlmStreamChunk::text("Give ACT ", "echo")),
                Ok(LlmStreamChunk::text("[1].", "echo")),
                Ok(LlmStreamChunk::finished("echo", None)),
            ])))
        }
    }

    async fn start(chunks: Vec<DocumentChunk>) -> String {
        start_with(chunks).await.0
    }

    async fn start_with(chunks: Vec<DocumentChunk>) -> (String, Arc<SessionOrchestrator>) {
        let embedder = Arc::new(TrigramProvider::new(64));
        let retriever = Retriever::new(Arc::new(MemoryStore::with_chunks(chunks)), embedder);
        let composer = AnswerComposer::new(
            Arc::new(EchoLlm),
            medrag_prompt::answer_prompt(),
            GenerationOptions::for_model("echo"),
        );
        let orchestrator = Arc::new(SessionOrchestrator::new(retriever, composer, 3));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&orchestrator));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), orchestrator)
    }

    async fn malaria_chunk() -> DocumentChunk {
        let text = "Treat uncomplicated malaria with artemisinin combination therapy.";
        DocumentChunk {
            id: "malaria-0".to_string(),
            source_document: "malaria.txt".to_string(),
            section: Some("page 1".to_string()),
            position: 0,
            text: text.to_string(),
            embedding: TrigramProvider::new(64).embed(text).await.unwrap(),
            indexed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let base = start(Vec::new()).await;
        let response = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_conversation_lifecycle_over_sse() {
        let base = start(vec![malaria_chunk().await]).await;
        let client = reqwest::Client::new();

        let created: serde_json::Value = client
            .post(format!("{}/api/conversations", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["conversationId"].as_str().unwrap().to_string();

        let body = client
            .post(format!("{}/api/conversations/{}/turns", base, id))
            .json(&serde_json::json!({ "text": "How is uncomplicated malaria treated?" }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("event: fragment"));
        assert!(body.contains("event: completed"));
        assert!(body.contains("malaria.txt"));

        let history: serde_json::Value = client
            .get(format!("{}/api/conversations/{}", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history["turns"].as_array().unwrap().len(), 1);
        assert_eq!(history["phase"], "idle");
    }

    #[tokio::test]
    async fn test_turn_on_empty_store_streams_error_event() {
        let (base, orchestrator) = start_with(Vec::new()).await;
        let id = orchestrator.create_conversation();
        let body = reqwest::Client::new()
            .post(format!("{}/api/conversations/{}/turns", base, id))
            .json(&serde_json::json!({ "text": "dose?" }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("event: error"));
        assert!(body.contains("\"kind\":\"retrieval\""));
        assert!(!body.contains("event: fragment"));
    }

    #[tokio::test]
    async fn test_ask_and_errors() {
        let base = start(vec![malaria_chunk().await]).await;
        let client = reqwest::Client::new();

        let response: AskResponse = client
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({ "query": "malaria treatment" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response.answer, "Give ACT [1].");
        assert_eq!(response.citations[0].source_document, "malaria.txt");

        let empty = client
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({ "query": "  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

        let missing = client
            .get(format!("{}/api/conversations/unknown", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ask_accepts_query_string() {
        let base = start(vec![malaria_chunk().await]).await;

        let response: AskResponse = reqwest::Client::new()
            .post(format!("{}/ask?query=malaria%20treatment", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response.answer, "Give ACT [1].");
        assert_eq!(response.conversation_id, None);
    }

    #[tokio::test]
    async fn test_conversations_do_not_accumulate() {
        let (base, orchestrator) = start_with(vec![malaria_chunk().await]).await;
        let client = reqwest::Client::new();

        for _ in 0..3 {
            let status = client
                .post(format!("{}/ask", base))
                .json(&serde_json::json!({ "query": "malaria treatment" }))
                .send()
                .await
                .unwrap()
                .status();
            assert_eq!(status, reqwest::StatusCode::OK);
        }
        assert!(orchestrator.conversation_ids().is_empty());

        let unknown = client
            .post(format!("{}/api/conversations/made-up/turns", base))
            .json(&serde_json::json!({ "text": "dose?" }))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);
        assert!(orchestrator.conversation_ids().is_empty());

        let id = orchestrator.create_conversation();
        let url = format!("{}/api/conversations/{}", base, id);
        let deleted = client.delete(&url).send().await.unwrap();
        assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);
        assert!(orchestrator.conversation_ids().is_empty());

        let again = client.delete(&url).send().await.unwrap();
        assert_eq!(again.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
