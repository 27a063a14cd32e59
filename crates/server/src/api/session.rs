use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tetramem_shared::AppError;

use crate::utils::{apply_prefix, registry, AppState};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeletionCounts {
  pub session_id: String,
  pub l1_turns_deleted: u64,
  pub l2_facts_deleted: u64,
  pub l3_episodes_deleted: u64,
}

async fn reset_one(state: &AppState, session_id: &str) -> Result<DeletionCounts, AppError> {
  let l1_turns_deleted = state.tier1.delete(session_id).await?;
  let l2_facts_deleted = state.tier2.delete(session_id).await?;
  let l3_episodes_deleted = state.tier3.delete(session_id).await?;
  registry::untrack_session(&state.redis, session_id).await?;

  Ok(DeletionCounts {
    session_id: session_id.to_owned(),
    l1_turns_deleted,
    l2_facts_deleted,
    l3_episodes_deleted,
  })
}

fn missing_session_id() -> AppError {
  AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!("X-Session-Id header is required"))
}

/// Clears one session's L1/L2 rows and drops it from the tracked-session set.
#[utoipa::path(
  post,
  path = "/control/session/reset",
  responses(
    (status = 200, description = "Session reset", body = DeletionCounts),
    (status = 400, description = "Missing X-Session-Id"),
  )
)]
#[axum::debug_handler]
pub async fn session_reset(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<DeletionCounts>, AppError> {
  let raw_session_id = headers.get("x-session-id").and_then(|v| v.to_str().ok()).ok_or_else(missing_session_id)?;
  let session_id = apply_prefix(state.session_prefix, raw_session_id);
  Ok(Json(reset_one(&state, &session_id).await?))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CleanupParams {
  pub session_id: String,
}

/// Same as `/control/session/reset`, scoped to one session id or every
/// tracked session (`session_id=all`).
#[utoipa::path(
  post,
  path = "/cleanup_force",
  params(CleanupParams),
  responses(
    (status = 200, description = "Deletion counts", body = Vec<DeletionCounts>),
  )
)]
#[axum::debug_handler]
pub async fn cleanup_force(State(state): State<AppState>, Query(params): Query<CleanupParams>) -> Result<Json<Vec<DeletionCounts>>, AppError> {
  if params.session_id == "all" {
    let sessions = registry::tracked_sessions(&state.redis).await?;
    let mut counts = Vec::with_capacity(sessions.len());
    for session_id in sessions {
      counts.push(reset_one(&state, &session_id).await?);
    }
    return Ok(Json(counts));
  }

  let session_id = apply_prefix(state.session_prefix, &params.session_id);
  Ok(Json(vec![reset_one(&state, &session_id).await?]))
}

/// Prefixed session ids currently tracked.
#[utoipa::path(
  get,
  path = "/sessions",
  responses((status = 200, description = "Tracked session ids", body = Vec<String>)),
)]
#[axum::debug_handler]
pub async fn sessions(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
  Ok(Json(registry::tracked_sessions(&state.redis).await?))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MemoryStateResponse {
  pub session_id: String,
  pub l1_turns: u64,
  pub l2_facts: u64,
  pub l3_episodes: u64,
  pub l4_docs: u64,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct MemoryStateParams {
  pub session_id: String,
}

/// Per-tier row counts for one session. `l4_docs` counts distilled
/// documents reachable from this session's episodes, since L4 itself is not
/// session-partitioned.
#[utoipa::path(
  get,
  path = "/memory_state",
  params(MemoryStateParams),
  responses((status = 200, description = "Per-tier counts", body = MemoryStateResponse)),
)]
#[axum::debug_handler]
pub async fn memory_state(State(state): State<AppState>, Query(params): Query<MemoryStateParams>) -> Result<Json<MemoryStateResponse>, AppError> {
  let session_id = apply_prefix(state.session_prefix, &params.session_id);

  let l1_turns = state.tier1.retrieve_session(&session_id).await?.len() as u64;
  let l2_facts = state.tier2.count_by_session(&session_id).await?;
  let l3_episodes = state.tier3.count_by_session(&session_id).await?;
  let l4_docs = state.tier4.count_active().await?;

  Ok(Json(MemoryStateResponse { session_id, l1_turns, l2_facts, l3_episodes, l4_docs }))
}
