use std::sync::Arc;

use apalis::prelude::Data;
use serde::{Deserialize, Serialize};
use tetramem_core::ConsolidationEngine;

use super::WorkerError;

/// Job to run one consolidation pass (L2 -> L3) for a session.
///
/// Enqueued reactively when `fact_promoted` crosses `consolidation_fact_threshold`,
/// or by the wake-up sweep for every tracked session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationJob {
  pub session_id: String,
}

pub async fn process_consolidation(
  job: ConsolidationJob,
  engine: Data<Arc<ConsolidationEngine>>,
) -> Result<(), WorkerError> {
  let outcome = engine.consolidate_session(&job.session_id).await?;
  tracing::debug!(
    session_id = %job.session_id,
    episode_id = ?outcome.episode_id,
    facts_folded = outcome.facts_folded,
    "consolidation job complete"
  );
  Ok(())
}
