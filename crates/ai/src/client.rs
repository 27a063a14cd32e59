use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

use async_openai::{Client, config::OpenAIConfig};
use tetramem_shared::APP_CONFIG;

/// Trip a provider's circuit after this many consecutive failures.
const FAILURE_THRESHOLD: u32 = 3;
/// How long a tripped circuit stays open before the next call is allowed through again.
const COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Breaker {
  consecutive_failures: u32,
  opened_at: Option<Instant>,
}

pub(crate) struct Provider {
  base_url: String,
  model: String,
  embedding_model: String,
  client: Client<OpenAIConfig>,
  breaker: Mutex<Breaker>,
}

impl Provider {
  fn new(base_url: &str, api_key: &str, model: &str, embedding_model: &str) -> Self {
    let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(base_url);
    Self {
      base_url: base_url.to_owned(),
      model: model.to_owned(),
      embedding_model: embedding_model.to_owned(),
      client: Client::with_config(config),
      breaker: Mutex::new(Breaker::default()),
    }
  }

  fn is_open(&self) -> bool {
    let breaker = self.breaker.lock().expect("breaker mutex poisoned");
    matches!(breaker.opened_at, Some(opened) if opened.elapsed() < COOLDOWN)
  }

  fn record_success(&self) {
    let mut breaker = self.breaker.lock().expect("breaker mutex poisoned");
    breaker.consecutive_failures = 0;
    breaker.opened_at = None;
  }

  fn record_failure(&self) {
    let mut breaker = self.breaker.lock().expect("breaker mutex poisoned");
    breaker.consecutive_failures += 1;
    if breaker.consecutive_failures >= FAILURE_THRESHOLD {
      breaker.opened_at = Some(Instant::now());
    }
  }
}

/// Tokens reported by a provider for a single completion.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
  pub prompt_tokens: u32,
  pub completion_tokens: u32,
  pub total_tokens: u32,
}

/// Shared OpenAI-compatible client with ordered provider fallback and a
/// per-provider circuit breaker. One instance is shared across every task via
/// [`LLM_CLIENT`]; providers are tried in the configured order, skipping any
/// whose circuit is currently open, until one succeeds or all have failed.
pub struct LlmClient {
  providers: Vec<Provider>,
}

impl LlmClient {
  fn new() -> Self {
    let mut providers = vec![Provider::new(
      &APP_CONFIG.openai_base_url,
      &APP_CONFIG.openai_api_key,
      &APP_CONFIG.openai_chat_model,
      &APP_CONFIG.openai_embedding_model,
    )];
    for base_url in &APP_CONFIG.llm_fallback_base_urls {
      providers.push(Provider::new(
        base_url,
        &APP_CONFIG.openai_api_key,
        &APP_CONFIG.openai_chat_model,
        &APP_CONFIG.openai_embedding_model,
      ));
    }
    Self { providers }
  }

  /// Providers in fallback order, skipping open circuits first and only
  /// falling back to them if every provider is currently tripped.
  fn ordered_providers(&self) -> impl Iterator<Item = &Provider> {
    let (closed, open): (Vec<_>, Vec<_>) = self.providers.iter().partition(|p| !p.is_open());
    closed.into_iter().chain(open)
  }

  pub(crate) async fn try_each<T, F, Fut>(&self, mut attempt: F) -> Result<T, anyhow::Error>
  where
    F: FnMut(&Provider) -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
  {
    let mut last_err = None;
    for provider in self.ordered_providers() {
      match attempt(provider).await {
        Ok(value) => {
          provider.record_success();
          return Ok(value);
        }
        Err(err) => {
          tracing::warn!(provider = %provider.base_url, error = %err, "provider call failed");
          provider.record_failure();
          last_err = Some(err);
        }
      }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no LLM provider configured")))
  }
}

impl Provider {
  pub(crate) fn client(&self) -> &Client<OpenAIConfig> {
    &self.client
  }

  pub(crate) fn model(&self) -> &str {
    &self.model
  }

  pub(crate) fn embedding_model(&self) -> &str {
    &self.embedding_model
  }

  pub(crate) fn base_url(&self) -> &str {
    &self.base_url
  }
}

pub static LLM_CLIENT: LazyLock<Arc<LlmClient>> = LazyLock::new(|| Arc::new(LlmClient::new()));
