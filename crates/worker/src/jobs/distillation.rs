use std::sync::Arc;

use apalis::prelude::Data;
use serde::{Deserialize, Serialize};
use tetramem_core::DistillationEngine;

use super::WorkerError;

/// Job to run one distillation pass (L3 -> L4) for a session.
///
/// Enqueued reactively when `episode_consolidated` crosses
/// `distillation_episode_threshold`, or by the wake-up sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillationJob {
  pub session_id: String,
}

pub async fn process_distillation(
  job: DistillationJob,
  engine: Data<Arc<DistillationEngine>>,
) -> Result<(), WorkerError> {
  let outcome = engine.distill_session(&job.session_id).await?;
  tracing::debug!(
    session_id = %job.session_id,
    document_id = ?outcome.document_id,
    episodes_folded = outcome.episodes_folded,
    "distillation job complete"
  );
  Ok(())
}
