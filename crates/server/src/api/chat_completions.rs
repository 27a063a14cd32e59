use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tetramem_ai::TokenUsage;
use tetramem_shared::{AppError, Deadline};
use uuid::Uuid;

use crate::utils::{apply_prefix, registry, AppState};

#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChatCompletionRequest {
  pub model: Option<String>,
  pub messages: Vec<ChatMessage>,
  #[serde(default)]
  pub stream: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Choice {
  pub index: u32,
  pub message: ChatMessage,
  pub finish_reason: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Usage {
  pub prompt_tokens: u32,
  pub completion_tokens: u32,
  pub total_tokens: u32,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TurnMetadata {
  pub turn_id: String,
  pub agent_variant: String,
  pub provider: Option<String>,
  pub storage_ms_pre: u64,
  pub llm_ms: u64,
  pub storage_ms_post: u64,
  pub storage_ms: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ChatCompletionResponse {
  pub id: String,
  pub object: String,
  pub created: i64,
  pub model: String,
  pub choices: Vec<Choice>,
  pub usage: Usage,
  pub metadata: TurnMetadata,
}

/// Rough token estimate (chars / 4), good enough to price a rate-limit
/// request but not for billing — the same approximation `tetramem_core`'s
/// context assembler uses for its own trim budget.
fn estimate_tokens(messages: &[ChatMessage]) -> u32 {
  let chars: usize = messages.iter().map(|m| m.content.len()).sum();
  u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

fn bad_request(msg: impl Into<String>) -> AppError {
  AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(msg.into()))
}

/// Upper bound on one turn's end-to-end storage + LLM time, propagated into
/// the agent pipeline via `Deadline::guard` so a wedged provider or backend
/// cannot hold the request open indefinitely.
const TURN_DEADLINE: Duration = Duration::from_secs(60);

/// OpenAI-compatible chat completion, backed by the configured agent variant.
#[utoipa::path(
  post,
  path = "/v1/chat/completions",
  request_body = ChatCompletionRequest,
  responses(
    (status = 200, description = "Completion produced", body = ChatCompletionResponse),
    (status = 400, description = "Missing X-Session-Id, empty messages, or stream=true"),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, headers, payload))]
pub async fn chat_completions(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(payload): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, AppError> {
  if payload.stream {
    return Err(bad_request("stream responses are not supported"));
  }

  let raw_session_id = headers
    .get("x-session-id")
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| bad_request("X-Session-Id header is required"))?;
  let session_id = apply_prefix(state.session_prefix, raw_session_id);

  let user_message_count = payload.messages.iter().filter(|m| m.role == "user").count();
  if user_message_count == 0 {
    return Err(bad_request("messages must contain at least one user message"));
  }
  let turn_id = (user_message_count - 1).to_string();

  let user_content = payload
    .messages
    .iter()
    .rev()
    .find(|m| m.role == "user")
    .map(|m| m.content.clone())
    .ok_or_else(|| bad_request("messages must contain at least one user message"))?;

  let metadata = headers
    .get("traceparent")
    .and_then(|v| v.to_str().ok())
    .map(|traceparent| serde_json::json!({ "traceparent": traceparent }));

  let mock_time = match headers.get("x-mock-time").and_then(|v| v.to_str().ok()) {
    Some(raw) => Some(
      DateTime::parse_from_rfc3339(raw)
        .map_err(|_| bad_request("X-Mock-Time must be ISO-8601"))?
        .with_timezone(&Utc),
    ),
    None => None,
  };

  let cost = estimate_tokens(&payload.messages);

  let pre_start = Instant::now();
  registry::track_session(&state.redis, &session_id).await?;
  state.rate_limiter.acquire(cost).await;
  let storage_ms_pre = pre_start.elapsed().as_millis() as u64;

  let deadline = Deadline::after(TURN_DEADLINE);
  let llm_start = Instant::now();
  let turn_result = deadline.guard(state.agent.handle_turn(&session_id, &turn_id, &user_content, metadata)).await;
  let llm_ms = llm_start.elapsed().as_millis() as u64;

  let turn_state = match turn_result {
    Ok(turn_state) => turn_state,
    Err(err) => {
      state.rate_limiter.penalize(cost);
      return Err(err);
    }
  };

  let post_start = Instant::now();
  registry::refresh_last_activity(&state.redis).await?;
  let storage_ms_post = post_start.elapsed().as_millis() as u64;

  let usage = turn_state.usage.unwrap_or(TokenUsage { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0 });
  let model = payload.model.or(turn_state.model).unwrap_or_else(|| tetramem_shared::APP_CONFIG.openai_chat_model.clone());
  let created = mock_time.unwrap_or_else(Utc::now).timestamp();

  Ok(Json(ChatCompletionResponse {
    id: format!("chatcmpl-{}", Uuid::now_v7()),
    object: "chat.completion".to_owned(),
    created,
    model,
    choices: vec![Choice {
      index: 0,
      message: ChatMessage { role: "assistant".to_owned(), content: turn_state.response.unwrap_or_default() },
      finish_reason: "stop".to_owned(),
    }],
    usage: Usage { prompt_tokens: usage.prompt_tokens, completion_tokens: usage.completion_tokens, total_tokens: usage.total_tokens },
    metadata: TurnMetadata {
      turn_id,
      agent_variant: state.agent.variant_name().to_owned(),
      provider: turn_state.provider,
      storage_ms_pre,
      llm_ms,
      storage_ms_post,
      storage_ms: storage_ms_pre + storage_ms_post,
    },
  }))
}
