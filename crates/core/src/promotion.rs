//! Promotion engine (L1 → L2): turns a session's recent turns into facts.
//!
//! Each L1 turn is appended with a cheap, certainty=impact=1.0 pre-score
//! (computed from the turn's own age/access-count) and a placeholder
//! `fact_id` derived under `fact_type = "turn"`. The atomic-promotion script
//! treats this as the candidate filter described in the spec; it is
//! deliberately coarser than the real `ciar_score` computed in step 3 below,
//! which uses the LLM's own `certainty`/`impact` judgment for the extracted
//! claim. After a batch is processed, each turn's placeholder id is also
//! added to the L2 index set — not as a fact, just as a "already
//! considered" marker — so a later sweep does not resend the same turns to
//! the LLM once they have already yielded (or failed to yield) a fact.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tetramem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, generate_object,
};
use tetramem_entities::fact;
use tetramem_kv::{LifecycleBus, NamespaceManager, ScriptManager};
use tetramem_shared::{AppError, ids};

use crate::ciar::ciar_score;
use crate::tier2::WorkingMemoryTier;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You extract durable facts worth remembering from a short window of a \
conversation. A fact has a short natural-language `content`, a `type` (one \
of: preference, observation, instruction, relationship, other), a `category` \
tag, a `certainty` in [0,1] (how sure you are this is true and durable, not \
a passing remark), and an `impact` in [0,1] (how much this should influence \
future behavior if true). Ignore transient state (\"I'm tired right now\" is \
not a fact). If nothing durable is present, return an empty `facts` array.";

const MAX_EXTRACTION_ATTEMPTS: u32 = 3;
const LEASE_TTL_MS: u64 = 30_000;

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedFacts {
  facts: Vec<ExtractedFact>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedFact {
  content: String,
  #[serde(rename = "type")]
  fact_type: String,
  category: String,
  certainty: f32,
  impact: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromotionOutcome {
  pub session_id: String,
  pub promoted_fact_ids: Vec<uuid::Uuid>,
}

pub struct PromotionEngine {
  redis: ConnectionManager,
  scripts: ScriptManager,
  tier2: Arc<WorkingMemoryTier>,
  bus: Arc<LifecycleBus>,
  batch_size: u64,
}

impl PromotionEngine {
  pub fn new(redis: ConnectionManager, tier2: Arc<WorkingMemoryTier>, bus: Arc<LifecycleBus>, batch_size: u64) -> Self {
    Self {
      redis,
      scripts: ScriptManager::new(),
      tier2,
      bus,
      batch_size,
    }
  }

  /// Runs one promotion pass for a session. A no-op if another promotion for
  /// the same session is already in flight (session-local lease), or if
  /// there are no eligible candidate turns.
  pub async fn promote_session(&self, session_id: &str, threshold: f64) -> Result<PromotionOutcome, AppError> {
    let lease_key = NamespaceManager::promotion_lease(session_id);
    let mut conn = self.redis.clone();

    if !ScriptManager::try_acquire_promotion_lease(&mut conn, &lease_key, LEASE_TTL_MS).await? {
      return Ok(PromotionOutcome {
        session_id: session_id.to_owned(),
        promoted_fact_ids: Vec::new(),
      });
    }

    let result = self.promote_session_inner(session_id, threshold).await;
    ScriptManager::release_promotion_lease(&mut conn, &lease_key).await?;
    result
  }

  async fn promote_session_inner(&self, session_id: &str, threshold: f64) -> Result<PromotionOutcome, AppError> {
    let l1_key = NamespaceManager::l1_turns(session_id);
    let l2_index_key = NamespaceManager::l2_facts_index(session_id);
    let mut conn = self.redis.clone();

    let candidates = self
      .scripts
      .execute_atomic_promotion(&mut conn, &l1_key, &l2_index_key, threshold, self.batch_size)
      .await?;

    if candidates.is_empty() {
      return Ok(PromotionOutcome {
        session_id: session_id.to_owned(),
        promoted_fact_ids: Vec::new(),
      });
    }

    let mut transcript = String::new();
    for candidate in &candidates {
      transcript.push_str(&candidate.content);
      transcript.push('\n');
    }

    let extraction = self.extract_with_retry(&transcript).await;
    let extraction = match extraction {
      Ok(output) => output,
      Err(err) => {
        self
          .bus
          .publish(
            "promotion_failed",
            session_id,
            json!({"reason": err.to_string(), "candidate_count": candidates.len()}),
          )
          .await;
        return Err(err);
      }
    };

    let now = Utc::now();
    let mut promoted_ids = Vec::new();

    for extracted in extraction.value.facts {
      let days_old = 0.0;
      let access_count = 0;
      let score = ciar_score(
        f64::from(extracted.certainty),
        f64::from(extracted.impact),
        days_old,
        access_count,
      );

      let fact_id = ids::fact_id(session_id, &extracted.content, &extracted.fact_type);

      if self.tier2.is_indexed(session_id, &fact_id.to_string()).await? {
        continue;
      }

      self
        .bus
        .publish(
          "significance_scored",
          session_id,
          json!({
            "fact_id": fact_id,
            "certainty": extracted.certainty,
            "impact": extracted.impact,
            "ciar_score": score,
          }),
        )
        .await;

      if score < threshold {
        continue;
      }

      let model = fact::Model {
        id: fact_id,
        session_id: session_id.to_owned(),
        content: extracted.content.clone(),
        fact_type: extracted.fact_type.clone(),
        category: extracted.category.clone(),
        extracted_at: now.into(),
        certainty: extracted.certainty,
        impact: extracted.impact,
        ciar_score: score as f32,
        access_count: 0,
        last_accessed: now.into(),
        source_turn_ids: candidates.iter().map(|c| c.turn_id.clone()).collect(),
        justification: Some(format!(
          "certainty={:.2} impact={:.2} ciar={:.2}",
          extracted.certainty, extracted.impact, score
        )),
        supersedes_fact_id: None,
        consolidated: false,
      };

      self.tier2.store(model).await?;
      promoted_ids.push(fact_id);

      self
        .bus
        .publish(
          "fact_promoted",
          session_id,
          json!({"fact_id": fact_id, "justification": format!("ciar={:.2}", score)}),
        )
        .await;
    }

    // Mark every candidate turn as considered, regardless of whether it
    // produced a surviving fact, so the next sweep does not resend it. The
    // placeholder id is the one the turn already carries (see `tier1`).
    for candidate in &candidates {
      let _: () = conn.sadd(&l2_index_key, candidate.fact_id.clone()).await?;
    }

    Ok(PromotionOutcome {
      session_id: session_id.to_owned(),
      promoted_fact_ids: promoted_ids,
    })
  }

  async fn extract_with_retry(
    &self,
    transcript: &str,
  ) -> Result<tetramem_ai::ObjectCompletion<ExtractedFacts>, AppError> {
    let system = ChatCompletionRequestSystemMessage::from(EXTRACTION_SYSTEM_PROMPT);
    let user = ChatCompletionRequestUserMessage::from(transcript.to_owned());
    let messages = vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ];

    let mut last_err = None;
    for attempt in 0..MAX_EXTRACTION_ATTEMPTS {
      match generate_object::<ExtractedFacts>(
        messages.clone(),
        "fact_extraction".to_owned(),
        Some("Extract durable facts from recent conversation turns".to_owned()),
      )
      .await
      {
        Ok(output) => return Ok(output),
        Err(err) => {
          tracing::warn!(attempt, error = %err, "fact extraction attempt failed");
          last_err = Some(err);
          tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt + 1))).await;
        }
      }
    }
    Err(last_err.unwrap_or_else(|| AppError::new(anyhow::anyhow!("fact extraction failed with no error captured"))))
  }
}
