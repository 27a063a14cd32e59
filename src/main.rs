use std::sync::Arc;
use std::time::Duration;

use apalis_postgres::PostgresStorage;
use clap::{Parser, ValueEnum};
use redis::Client;
use sea_orm::Database;
use tetramem_core::{
  ActiveContextTier, Agent, ContextAssembler, EpisodicTier, FullContextAgent, MemoryAgent, PromotionEngine, RagAgent, SemanticTier,
  WorkingMemoryTier,
};
use tetramem_graph::GraphClient;
use tetramem_kv::LifecycleBus;
use tetramem_migration::{Migrator, MigratorTrait};
use tetramem_server::server;
use tetramem_shared::{APP_CONFIG, AppError};
use tetramem_worker::{ConsolidationJob, DistillationJob, PromotionJob, WorkerConfig, WorkerStorages, worker};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentType {
  Memory,
  Rag,
  FullContext,
}

#[derive(Debug, Parser)]
#[command(name = "tetramem", about = "Tiered conversational memory service")]
struct Cli {
  /// Which agent variant serves /v1/chat/completions.
  #[arg(long, value_enum, default_value = "memory")]
  agent_type: AgentType,

  /// HTTP port the server binds to.
  #[arg(long, default_value_t = 3000)]
  port: u16,

  /// Overrides OPENAI_CHAT_MODEL for this process only.
  #[arg(long)]
  model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let cli = Cli::parse();

  let db = Database::connect(APP_CONFIG.database_url.as_str()).await?;
  Migrator::up(&db, None).await?;

  let pool = db.get_postgres_connection_pool();
  PostgresStorage::<PromotionJob>::setup(pool).await?;
  PostgresStorage::<ConsolidationJob>::setup(pool).await?;
  PostgresStorage::<DistillationJob>::setup(pool).await?;
  let storages = WorkerStorages {
    promotion: PostgresStorage::<PromotionJob>::new(pool.clone()),
    consolidation: PostgresStorage::<ConsolidationJob>::new(pool.clone()),
    distillation: PostgresStorage::<DistillationJob>::new(pool.clone()),
  };

  let redis_client = Client::open(APP_CONFIG.redis_url.as_str())?;
  let redis = redis::aio::ConnectionManager::new(redis_client).await?;

  let graph = Arc::new(GraphClient::connect(&APP_CONFIG.neo4j_uri, &APP_CONFIG.neo4j_user, &APP_CONFIG.neo4j_password).await?);
  let bus = Arc::new(LifecycleBus::new(redis.clone()));

  let tier1 = Arc::new(ActiveContextTier::new(redis.clone(), APP_CONFIG.window_size, APP_CONFIG.ttl_hours));
  let tier2 = Arc::new(WorkingMemoryTier::new(db.clone(), redis.clone()));
  let tier3 = Arc::new(EpisodicTier::new(db.clone(), Arc::clone(&graph)));
  let tier4 = Arc::new(SemanticTier::new(db.clone()));

  let context = Arc::new(ContextAssembler::new(Arc::clone(&tier1), Arc::clone(&tier2), Arc::clone(&tier3), Arc::clone(&tier4)));
  let promotion_engine = Arc::new(PromotionEngine::new(redis.clone(), Arc::clone(&tier2), Arc::clone(&bus), APP_CONFIG.batch_min_turns));

  if let Some(model) = &cli.model {
    tracing::info!(model, "overriding chat model for this process");
  }

  let agent = Arc::new(match cli.agent_type {
    AgentType::Memory => Agent::Memory(MemoryAgent::new(
      Arc::clone(&tier1),
      context,
      promotion_engine,
      APP_CONFIG.min_ciar,
      APP_CONFIG.max_turns,
      APP_CONFIG.max_facts,
      APP_CONFIG.max_context_tokens,
      f64::from(APP_CONFIG.promotion_threshold),
    )),
    AgentType::Rag => Agent::Rag(RagAgent::new(Arc::clone(&tier1), Arc::clone(&tier3), Arc::clone(&tier4), APP_CONFIG.max_turns)),
    AgentType::FullContext => Agent::FullContext(FullContextAgent::new(Arc::clone(&tier1), Some(APP_CONFIG.max_context_tokens))),
  });

  let rate_limiter = Arc::new(tetramem_server::utils::TokenBudget::new(APP_CONFIG.rate_limit_tokens_per_minute));
  let app_state = tetramem_server::utils::AppState::new(redis.clone(), tier1, tier2, tier3, tier4, agent, rate_limiter);

  let worker_config = WorkerConfig {
    promotion_threshold: f64::from(APP_CONFIG.promotion_threshold),
    batch_min_turns: APP_CONFIG.batch_min_turns,
    consolidation_fact_threshold: APP_CONFIG.consolidation_fact_threshold,
    distillation_episode_threshold: APP_CONFIG.distillation_episode_threshold,
    sweep_interval_seconds: APP_CONFIG.sweep_interval_seconds,
    stuck_timeout: Duration::from_secs(APP_CONFIG.stuck_timeout_minutes * 60),
  };

  tokio::try_join!(
    worker(db, redis, graph, bus, storages, worker_config),
    server(cli.port, app_state),
  )?;

  Ok(())
}
