//! Consolidation engine (L2 → L3): folds a session's accrued facts into an
//! episode. Grounded on the CLS-replay shape of the teacher's semantic
//! consolidation (load related context, single LLM call, batch-embed before
//! opening a transaction, then mutate), adapted to this tier's direction:
//! facts in, one episode summary + relationship set out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tetramem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, embed,
  generate_object,
};
use tetramem_entities::{episode, fact};
use tetramem_kv::LifecycleBus;
use tetramem_shared::AppError;
use uuid::Uuid;

use crate::tier2::WorkingMemoryTier;
use crate::tier3::{EpisodicTier, Relationship};

const CONSOLIDATION_SYSTEM_PROMPT: &str = "\
You are consolidating a batch of short-term facts about a conversation into \
a single episode: a natural-language `summary` of what happened, the \
`entities` (people, places, things, topics) involved, and any \
`relationships` between them, each as `{subject, predicate, object}` in a \
consistent subject-predicate-object form (e.g. subject=\"user\", \
predicate=\"lives_in\", object=\"Boston\"). Write the summary as a short \
paragraph a future reader could use to recall the gist without re-reading \
the facts. If the facts describe no meaningful relationship, return an \
empty `relationships` array.";

#[derive(Debug, Deserialize, JsonSchema)]
struct EpisodeSynthesis {
  summary: String,
  entities: Vec<String>,
  relationships: Vec<RelationshipDraft>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RelationshipDraft {
  subject: String,
  predicate: String,
  object: String,
}

#[derive(Debug, Clone)]
pub struct ConsolidationOutcome {
  pub session_id: String,
  pub episode_id: Option<Uuid>,
  pub facts_folded: usize,
}

pub struct ConsolidationEngine {
  tier2: Arc<WorkingMemoryTier>,
  tier3: Arc<EpisodicTier>,
  bus: Arc<LifecycleBus>,
  fact_threshold: u64,
}

impl ConsolidationEngine {
  pub fn new(tier2: Arc<WorkingMemoryTier>, tier3: Arc<EpisodicTier>, bus: Arc<LifecycleBus>, fact_threshold: u64) -> Self {
    Self {
      tier2,
      tier3,
      bus,
      fact_threshold,
    }
  }

  /// Folds a session's unconsolidated facts into one episode, if at least
  /// `fact_threshold` have accrued. A no-op (returns `episode_id: None`)
  /// below threshold.
  pub async fn consolidate_session(&self, session_id: &str) -> Result<ConsolidationOutcome, AppError> {
    let candidates = self.tier2.unconsolidated_facts(session_id, 50).await?;

    if (candidates.len() as u64) < self.fact_threshold {
      return Ok(ConsolidationOutcome {
        session_id: session_id.to_owned(),
        episode_id: None,
        facts_folded: 0,
      });
    }

    let synthesis = self.synthesize(&candidates).await?;

    let summary_embedding = embed(&synthesis.summary).await?;
    let now = Utc::now();
    let (window_start, window_end) = time_window(&candidates);
    let importance_score = average_ciar(&candidates);
    let episode_id = Uuid::now_v7();

    let model = episode::Model {
      id: episode_id,
      session_id: session_id.to_owned(),
      summary: synthesis.summary.clone(),
      time_window_start: window_start.into(),
      time_window_end: window_end.into(),
      fact_valid_from: now.into(),
      fact_valid_to: None,
      source_observation_timestamp: now.into(),
      importance_score,
      embedding: summary_embedding,
      entities: synthesis.entities,
      created_at: now.into(),
      distilled: false,
    };

    let relationships: Vec<Relationship> = synthesis
      .relationships
      .into_iter()
      .map(|r| (r.subject, r.predicate, r.object, now))
      .collect();

    self.tier3.store(model, &relationships).await?;

    let fact_ids: Vec<Uuid> = candidates.iter().map(|f| f.id).collect();
    self.tier2.mark_consolidated(&fact_ids).await?;

    self
      .bus
      .publish(
        "episode_consolidated",
        session_id,
        json!({"episode_id": episode_id, "facts_folded": fact_ids.len()}),
      )
      .await;

    Ok(ConsolidationOutcome {
      session_id: session_id.to_owned(),
      episode_id: Some(episode_id),
      facts_folded: fact_ids.len(),
    })
  }

  async fn synthesize(&self, facts: &[fact::Model]) -> Result<EpisodeSynthesis, AppError> {
    let mut transcript = String::new();
    for f in facts {
      transcript.push_str(&format!(
        "- [{}] ({}, certainty={:.2}, impact={:.2}) {}\n",
        f.fact_type, f.category, f.certainty, f.impact, f.content
      ));
    }

    let system = ChatCompletionRequestSystemMessage::from(CONSOLIDATION_SYSTEM_PROMPT);
    let user = ChatCompletionRequestUserMessage::from(transcript);
    let messages = vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ];

    let output = generate_object::<EpisodeSynthesis>(
      messages,
      "episode_consolidation".to_owned(),
      Some("Consolidate a batch of facts into one episode summary with entities and relationships".to_owned()),
    )
    .await?;

    Ok(output.value)
  }
}

fn time_window(facts: &[fact::Model]) -> (DateTime<Utc>, DateTime<Utc>) {
  let mut start = facts[0].extracted_at;
  let mut end = facts[0].extracted_at;
  for f in facts {
    if f.extracted_at < start {
      start = f.extracted_at;
    }
    if f.extracted_at > end {
      end = f.extracted_at;
    }
  }
  (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

fn average_ciar(facts: &[fact::Model]) -> f32 {
  if facts.is_empty() {
    return 0.0;
  }
  facts.iter().map(|f| f.ciar_score).sum::<f32>() / facts.len() as f32
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn sample_fact(ciar: f32, extracted_at: DateTime<Utc>) -> fact::Model {
    fact::Model {
      id: Uuid::now_v7(),
      session_id: "s1".to_owned(),
      content: "likes coffee".to_owned(),
      fact_type: "preference".to_owned(),
      category: "food".to_owned(),
      extracted_at: extracted_at.into(),
      certainty: 0.9,
      impact: 0.5,
      ciar_score: ciar,
      access_count: 0,
      last_accessed: extracted_at.into(),
      source_turn_ids: vec![],
      justification: None,
      supersedes_fact_id: None,
      consolidated: false,
    }
  }

  #[test]
  fn time_window_spans_min_and_max() {
    let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
    let facts = vec![sample_fact(0.7, t2), sample_fact(0.9, t1)];
    let (start, end) = time_window(&facts);
    assert_eq!(start, t1);
    assert_eq!(end, t2);
  }

  #[test]
  fn average_ciar_is_the_mean() {
    let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let facts = vec![sample_fact(0.6, t), sample_fact(0.8, t)];
    assert!((average_ciar(&facts) - 0.7).abs() < 1e-6);
  }

  #[test]
  fn average_ciar_of_empty_is_zero() {
    assert_eq!(average_ciar(&[]), 0.0);
  }
}
