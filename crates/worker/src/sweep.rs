//! Periodic wake-up sweep: walks every tracked session and re-enqueues a
//! promotion/consolidation/distillation pass for each, so that accrual that
//! never crossed a reactive threshold (or that was dropped because a
//! lifecycle event was lost under backpressure) still eventually happens.
//! Also drains the episodic tier's graph-write repair queue once per cycle.

use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::TaskSink;
use apalis_postgres::PostgresStorage;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tetramem_core::EpisodicTier;
use tetramem_kv::NamespaceManager;
use tetramem_shared::AppError;

use crate::jobs::{ConsolidationJob, DistillationJob, PromotionJob};

pub async fn run_sweep(
  mut redis: ConnectionManager,
  tier3: Arc<EpisodicTier>,
  mut promotion_storage: PostgresStorage<PromotionJob>,
  mut consolidation_storage: PostgresStorage<ConsolidationJob>,
  mut distillation_storage: PostgresStorage<DistillationJob>,
  promotion_threshold: f64,
  interval_seconds: u64,
) -> Result<(), AppError> {
  let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));

  loop {
    ticker.tick().await;

    let sessions: Vec<String> = match redis.smembers(NamespaceManager::tracked_sessions()).await {
      Ok(sessions) => sessions,
      Err(err) => {
        tracing::error!(error = %err, "wake-up sweep failed to read tracked sessions");
        continue;
      }
    };

    tracing::debug!(sessions = sessions.len(), "wake-up sweep starting");

    for session_id in &sessions {
      if let Err(err) = promotion_storage
        .push(PromotionJob { session_id: session_id.clone(), threshold: promotion_threshold })
        .await
      {
        tracing::warn!(session_id, error = %err, "sweep failed to enqueue promotion job");
      }
      if let Err(err) = consolidation_storage
        .push(ConsolidationJob { session_id: session_id.clone() })
        .await
      {
        tracing::warn!(session_id, error = %err, "sweep failed to enqueue consolidation job");
      }
      if let Err(err) = distillation_storage
        .push(DistillationJob { session_id: session_id.clone() })
        .await
      {
        tracing::warn!(session_id, error = %err, "sweep failed to enqueue distillation job");
      }
    }

    match tier3.repair_pending().await {
      Ok(repaired) if repaired > 0 => {
        tracing::info!(repaired, "wake-up sweep repaired pending graph writes");
      }
      Ok(_) => {}
      Err(err) => tracing::error!(error = %err, "wake-up sweep repair pass failed"),
    }
  }
}
