use std::env;
use std::sync::LazyLock;

fn required_env(key: &str) -> String {
  env::var(key).unwrap_or_else(|_| panic!("env {key} must be set"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
  env::var(key)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
  env::var(key)
    .ok()
    .map(|v| {
      v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
    })
    .unwrap_or_default()
}

/// Process-wide typed configuration, loaded once from the environment.
///
/// Required keys panic at startup if absent; everything else falls back to
/// the defaults documented alongside the component that consumes it.
pub struct AppConfig {
  pub database_url: String,
  pub redis_url: String,
  pub neo4j_uri: String,
  pub neo4j_user: String,
  pub neo4j_password: String,

  pub openai_base_url: String,
  pub openai_api_key: String,
  pub openai_chat_model: String,
  pub openai_embedding_model: String,
  pub llm_fallback_base_urls: Vec<String>,

  pub window_size: u64,
  pub ttl_hours: u64,
  pub min_ciar: f32,
  pub max_turns: u64,
  pub max_facts: u64,
  pub batch_min_turns: u64,
  pub promotion_threshold: f32,
  pub consolidation_fact_threshold: u64,
  pub distillation_episode_threshold: u64,
  pub stuck_timeout_minutes: u64,
  pub metrics_sample_rate: f32,
  pub sweep_interval_seconds: u64,
  pub rate_limit_tokens_per_minute: u32,
  pub max_context_tokens: u64,
}

impl AppConfig {
  fn new() -> Self {
    dotenvy::dotenv().ok();

    Self {
      database_url: required_env("DATABASE_URL"),
      redis_url: required_env("REDIS_URL"),
      neo4j_uri: required_env("NEO4J_URI"),
      neo4j_user: required_env("NEO4J_USER"),
      neo4j_password: required_env("NEO4J_PASSWORD"),

      openai_base_url: required_env("OPENAI_BASE_URL"),
      openai_api_key: required_env("OPENAI_API_KEY"),
      openai_chat_model: required_env("OPENAI_CHAT_MODEL"),
      openai_embedding_model: required_env("OPENAI_EMBEDDING_MODEL"),
      llm_fallback_base_urls: env_list("LLM_FALLBACK_BASE_URLS"),

      window_size: env_or("WINDOW_SIZE", 20),
      ttl_hours: env_or("TTL_HOURS", 24),
      min_ciar: env_or("MIN_CIAR", 0.6),
      max_turns: env_or("MAX_TURNS", 20),
      max_facts: env_or("MAX_FACTS", 10),
      batch_min_turns: env_or("BATCH_MIN_TURNS", 5),
      promotion_threshold: env_or("PROMOTION_THRESHOLD", 0.6),
      consolidation_fact_threshold: env_or("CONSOLIDATION_FACT_THRESHOLD", 3),
      distillation_episode_threshold: env_or("DISTILLATION_EPISODE_THRESHOLD", 20),
      stuck_timeout_minutes: env_or("STUCK_TIMEOUT_MINUTES", 15),
      metrics_sample_rate: env_or("METRICS_SAMPLE_RATE", 1.0),
      sweep_interval_seconds: env_or("SWEEP_INTERVAL_SECONDS", 60),
      rate_limit_tokens_per_minute: env_or("RATE_LIMIT_TOKENS_PER_MINUTE", 60_000),
      max_context_tokens: env_or("MAX_CONTEXT_TOKENS", 120_000),
    }
  }
}

pub static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(AppConfig::new);
