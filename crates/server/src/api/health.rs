use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::utils::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
  pub status: String,
  pub redis: String,
  pub l1: String,
  pub l2: String,
  pub agent: String,
  pub agent_type: String,
  pub agent_variant: String,
}

fn status_of(ok: bool) -> &'static str {
  if ok { "ok" } else { "degraded" }
}

/// Process health: each tier's own `health_check`, rolled up into one
/// overall status.
#[utoipa::path(
  get,
  path = "/health",
  responses((status = 200, description = "Health summary", body = HealthResponse)),
)]
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
  let l1_ok = state.tier1.health_check().await.is_ok();
  let l2_ok = state.tier2.health_check().await.is_ok();
  let l3_ok = state.tier3.health_check().await.is_ok();

  let overall_ok = l1_ok && l2_ok && l3_ok;
  let variant = state.agent.variant_name();

  Json(HealthResponse {
    status: status_of(overall_ok).to_owned(),
    redis: status_of(l1_ok).to_owned(),
    l1: status_of(l1_ok).to_owned(),
    l2: status_of(l2_ok).to_owned(),
    agent: status_of(l3_ok).to_owned(),
    agent_type: variant.to_owned(),
    agent_variant: variant.to_owned(),
  })
}
