//! Background job processing: promotion/consolidation/distillation workers,
//! the periodic wake-up sweep, the lifecycle event consumer, and the
//! stuck-run watchdog, all running as concurrent `tokio` tasks under one
//! `apalis::Monitor`.

use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::{Monitor, WorkerBuilder};
use apalis_postgres::PostgresStorage;
use redis::aio::ConnectionManager;
use sea_orm::DatabaseConnection;
use tetramem_core::{ConsolidationEngine, DistillationEngine, EpisodicTier, PromotionEngine, SemanticTier, WorkingMemoryTier};
use tetramem_graph::GraphClient;
use tetramem_kv::LifecycleBus;
use tetramem_shared::AppError;

pub mod jobs;
pub mod lifecycle_consumer;
pub mod sweep;
pub mod watchdog;

pub use jobs::{ConsolidationJob, DistillationJob, PromotionJob, WorkerError};

/// Storage handles for the three background job queues, set up once at
/// process start (`PostgresStorage::setup` per queue) and threaded through
/// both the apalis workers and the wake-up sweep, which enqueues onto them.
#[derive(Clone)]
pub struct WorkerStorages {
  pub promotion: PostgresStorage<PromotionJob>,
  pub consolidation: PostgresStorage<ConsolidationJob>,
  pub distillation: PostgresStorage<DistillationJob>,
}

/// Tuning knobs the worker bootstrap needs from `AppConfig`; kept as a
/// plain struct rather than threading `&AppConfig` through so the worker
/// crate does not need to depend on process-wide config internals.
pub struct WorkerConfig {
  pub promotion_threshold: f64,
  pub batch_min_turns: u64,
  pub consolidation_fact_threshold: u64,
  pub distillation_episode_threshold: u64,
  pub sweep_interval_seconds: u64,
  pub stuck_timeout: Duration,
}

/// Runs every background engine/task for the process's lifetime. Returns on
/// clean shutdown (ctrl-c/SIGTERM) or propagates the first fatal error
/// (principally a tripped watchdog), which the caller should treat as a
/// reason to exit non-zero.
#[allow(clippy::too_many_arguments)]
pub async fn worker(
  db: DatabaseConnection,
  redis: ConnectionManager,
  graph: Arc<GraphClient>,
  bus: Arc<LifecycleBus>,
  storages: WorkerStorages,
  config: WorkerConfig,
) -> Result<(), AppError> {
  let tier2 = Arc::new(WorkingMemoryTier::new(db.clone(), redis.clone()));
  let tier3 = Arc::new(EpisodicTier::new(db.clone(), graph));
  let tier4 = Arc::new(SemanticTier::new(db));

  let promotion_engine = Arc::new(PromotionEngine::new(
    redis.clone(),
    Arc::clone(&tier2),
    Arc::clone(&bus),
    config.batch_min_turns,
  ));
  let consolidation_engine = Arc::new(ConsolidationEngine::new(
    Arc::clone(&tier2),
    Arc::clone(&tier3),
    Arc::clone(&bus),
    config.consolidation_fact_threshold,
  ));
  let distillation_engine = Arc::new(DistillationEngine::new(
    Arc::clone(&tier3),
    Arc::clone(&tier4),
    Arc::clone(&bus),
    config.distillation_episode_threshold,
  ));

  let sweep_handle = tokio::spawn(sweep::run_sweep(
    redis.clone(),
    Arc::clone(&tier3),
    storages.promotion.clone(),
    storages.consolidation.clone(),
    storages.distillation.clone(),
    config.promotion_threshold,
    config.sweep_interval_seconds,
  ));

  let consumer_bus = Arc::clone(&bus);
  let consolidation_storage_for_consumer = storages.consolidation.clone();
  let distillation_storage_for_consumer = storages.distillation.clone();
  let lifecycle_handle = tokio::spawn(async move {
    lifecycle_consumer::run_lifecycle_consumer(
      &consumer_bus,
      "tetramem-worker-1",
      consolidation_storage_for_consumer,
      distillation_storage_for_consumer,
    )
    .await
  });

  let watchdog_handle = tokio::spawn(watchdog::run_watchdog(redis, config.stuck_timeout));

  let monitor = Monitor::new()
    .register(
      WorkerBuilder::new("promotion-worker")
        .data(promotion_engine)
        .backend(storages.promotion)
        .build(jobs::process_promotion),
    )
    .register(
      WorkerBuilder::new("consolidation-worker")
        .data(consolidation_engine)
        .backend(storages.consolidation)
        .build(jobs::process_consolidation),
    )
    .register(
      WorkerBuilder::new("distillation-worker")
        .data(distillation_engine)
        .backend(storages.distillation)
        .build(jobs::process_distillation),
    )
    .shutdown_timeout(Duration::from_secs(5));

  tokio::select! {
    result = monitor.run_with_signal(tokio::signal::ctrl_c()) => {
      result.map_err(|err| AppError::new(anyhow::Error::new(err)))?;
    }
    result = sweep_handle => {
      result.map_err(|err| AppError::new(anyhow::anyhow!(err)))??;
    }
    result = lifecycle_handle => {
      result.map_err(|err| AppError::new(anyhow::anyhow!(err)))??;
    }
    result = watchdog_handle => {
      result.map_err(|err| AppError::new(anyhow::anyhow!(err)))??;
    }
  }

  Ok(())
}
