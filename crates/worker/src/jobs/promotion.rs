use std::sync::Arc;

use apalis::prelude::Data;
use serde::{Deserialize, Serialize};
use tetramem_core::PromotionEngine;

use super::WorkerError;

/// Job to run one promotion pass (L1 -> L2) for a session.
///
/// Enqueued by a turn handler once `batch_min_turns` turns have accrued, or
/// by the wake-up sweep for every tracked session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionJob {
  pub session_id: String,
  pub threshold: f64,
}

pub async fn process_promotion(
  job: PromotionJob,
  engine: Data<Arc<PromotionEngine>>,
) -> Result<(), WorkerError> {
  let outcome = engine.promote_session(&job.session_id, job.threshold).await?;
  tracing::debug!(
    session_id = %job.session_id,
    promoted = outcome.promoted_fact_ids.len(),
    "promotion job complete"
  );
  Ok(())
}
