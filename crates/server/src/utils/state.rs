use std::sync::Arc;

use redis::aio::ConnectionManager;
use tetramem_core::{ActiveContextTier, Agent, EpisodicTier, SemanticTier, WorkingMemoryTier};

use crate::utils::TokenBudget;

#[derive(Clone)]
pub struct AppState {
  pub redis: ConnectionManager,
  pub tier1: Arc<ActiveContextTier>,
  pub tier2: Arc<WorkingMemoryTier>,
  pub tier3: Arc<EpisodicTier>,
  pub tier4: Arc<SemanticTier>,
  pub agent: Arc<Agent>,
  pub rate_limiter: Arc<TokenBudget>,
  pub session_prefix: &'static str,
}

impl AppState {
  #[allow(clippy::too_many_arguments)]
  #[must_use]
  pub fn new(
    redis: ConnectionManager,
    tier1: Arc<ActiveContextTier>,
    tier2: Arc<WorkingMemoryTier>,
    tier3: Arc<EpisodicTier>,
    tier4: Arc<SemanticTier>,
    agent: Arc<Agent>,
    rate_limiter: Arc<TokenBudget>,
  ) -> Self {
    let session_prefix = match agent.variant_name() {
      "memory" => "memory",
      "rag" => "rag",
      _ => "full_context",
    };
    Self { redis, tier1, tier2, tier3, tier4, agent, rate_limiter, session_prefix }
  }
}
