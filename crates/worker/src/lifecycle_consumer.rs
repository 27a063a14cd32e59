//! Lifecycle event consumer: reacts to engine-published events with cheap
//! reactive enqueues. The downstream job still re-checks its own threshold
//! (`consolidation_fact_threshold`/`distillation_episode_threshold`), so an
//! enqueue here is a no-op whenever the session hasn't actually crossed it —
//! this consumer only needs to decide *when to check*, not *whether to act*.

use std::collections::HashMap;

use apalis::prelude::TaskSink;
use apalis_postgres::PostgresStorage;
use tetramem_kv::{Handler, LifecycleBus};
use tetramem_shared::AppError;

use crate::jobs::{ConsolidationJob, DistillationJob};

const CONSUMER_GROUP: &str = "tetramem-worker";

fn build_handlers(
  consolidation_storage: PostgresStorage<ConsolidationJob>,
  distillation_storage: PostgresStorage<DistillationJob>,
) -> HashMap<&'static str, Handler> {
  let mut handlers: HashMap<&'static str, Handler> = HashMap::new();

  handlers.insert(
    "fact_promoted",
    Box::new(move |event| {
      let mut storage = consolidation_storage.clone();
      Box::pin(async move {
        storage.push(ConsolidationJob { session_id: event.session_id }).await?;
        Ok(())
      })
    }),
  );

  handlers.insert(
    "episode_consolidated",
    Box::new(move |event| {
      let mut storage = distillation_storage.clone();
      Box::pin(async move {
        storage.push(DistillationJob { session_id: event.session_id }).await?;
        Ok(())
      })
    }),
  );

  handlers.insert(
    "promotion_failed",
    Box::new(move |event| {
      Box::pin(async move {
        tracing::warn!(session_id = %event.session_id, data = %event.data, "promotion_failed event observed");
        Ok(())
      })
    }),
  );

  handlers.insert(
    "knowledge_distilled",
    Box::new(move |event| {
      Box::pin(async move {
        tracing::info!(session_id = %event.session_id, data = %event.data, "knowledge_distilled event observed");
        Ok(())
      })
    }),
  );

  handlers
}

/// Drains pending (crash-recovery) deliveries once, then blocks for new
/// events in a loop. Intended to run as its own `tokio` task for the
/// lifetime of the process.
pub async fn run_lifecycle_consumer(
  bus: &LifecycleBus,
  consumer_id: &str,
  consolidation_storage: PostgresStorage<ConsolidationJob>,
  distillation_storage: PostgresStorage<DistillationJob>,
) -> Result<(), AppError> {
  bus.ensure_group(CONSUMER_GROUP).await.map_err(AppError::new)?;
  let handlers = build_handlers(consolidation_storage, distillation_storage);

  bus
    .drain_pending(CONSUMER_GROUP, consumer_id, &handlers)
    .await
    .map_err(AppError::new)?;

  loop {
    bus
      .read_new(CONSUMER_GROUP, consumer_id, &handlers, 5_000)
      .await
      .map_err(AppError::new)?;
  }
}
