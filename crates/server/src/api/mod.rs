use axum::{
  Json, Router,
  routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::utils::AppState;

mod chat_completions;
mod health;
mod session;

pub use chat_completions::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice, TurnMetadata, Usage};
pub use health::HealthResponse;
pub use session::{CleanupParams, DeletionCounts, MemoryStateParams, MemoryStateResponse};

#[derive(OpenApi)]
#[openapi(
  info(
    title = "Tetramem API",
    version = "0.0.1",
    description = "OpenAI-compatible chat surface over a tiered conversational memory system"
  ),
  paths(
    chat_completions::chat_completions,
    session::session_reset,
    session::cleanup_force,
    session::sessions,
    session::memory_state,
    health::health,
  ),
  components(schemas(
    ChatCompletionRequest,
    ChatCompletionResponse,
    ChatMessage,
    Choice,
    Usage,
    TurnMetadata,
    DeletionCounts,
    MemoryStateResponse,
    HealthResponse,
  ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
  Json(ApiDoc::openapi())
}

pub fn app() -> Router<AppState> {
  Router::new()
    .route("/v1/chat/completions", post(chat_completions::chat_completions))
    .route("/control/session/reset", post(session::session_reset))
    .route("/cleanup_force", post(session::cleanup_force))
    .route("/sessions", get(session::sessions))
    .route("/memory_state", get(session::memory_state))
    .route("/health", get(health::health))
    .route("/openapi.json", get(openapi_json))
    .merge(Scalar::with_url("/openapi/", ApiDoc::openapi()))
}
