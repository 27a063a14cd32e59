//! Distillation engine (L3 → L4): folds a cluster of episodes into a
//! long-lived knowledge document, detecting and resolving conflicts with
//! what is already known. Grounded on the same CLS-replay shape as
//! `consolidation`, one tier up: single LLM synthesis call, then a second,
//! narrower LLM call only when a title-similar document already exists.

use std::sync::Arc;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tetramem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, generate_object,
};
use tetramem_entities::{episode, knowledge_document};
use tetramem_kv::LifecycleBus;
use tetramem_shared::AppError;
use uuid::Uuid;

use crate::tier3::EpisodicTier;
use crate::tier4::SemanticTier;

const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You distill a cluster of episode summaries into one durable knowledge \
document: a `title` (short, specific), a `content` body (a few sentences, \
self-contained — a reader should not need the source episodes), a \
`knowledge_type` (one of: fact, preference, skill, procedure, relationship), \
and a `confidence_score` in [0,1] reflecting how consistently the episodes \
support this conclusion.";

const CONFLICT_SYSTEM_PROMPT: &str = "\
You are comparing a newly distilled knowledge document against an existing \
one with a similar title. Decide whether they are `compatible` (the new one \
refines, extends, or duplicates the existing one without contradicting it) \
or a `hard_conflict` (the new one contradicts the existing one, e.g. a \
preference or fact that has since changed). If `hard_conflict` is true, the \
new document should supersede the old.";

#[derive(Debug, Deserialize, JsonSchema)]
struct KnowledgeSynthesis {
  title: String,
  content: String,
  knowledge_type: String,
  confidence_score: f32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ConflictJudgement {
  hard_conflict: bool,
  reasoning: String,
}

#[derive(Debug, Clone)]
pub struct DistillationOutcome {
  pub session_id: String,
  pub document_id: Option<Uuid>,
  pub episodes_folded: usize,
  pub superseded_document_id: Option<Uuid>,
}

pub struct DistillationEngine {
  tier3: Arc<EpisodicTier>,
  tier4: Arc<SemanticTier>,
  bus: Arc<LifecycleBus>,
  episode_threshold: u64,
}

impl DistillationEngine {
  pub fn new(tier3: Arc<EpisodicTier>, tier4: Arc<SemanticTier>, bus: Arc<LifecycleBus>, episode_threshold: u64) -> Self {
    Self {
      tier3,
      tier4,
      bus,
      episode_threshold,
    }
  }

  /// Folds a session's undistilled episodes into one knowledge document, if
  /// at least `episode_threshold` have accrued. A no-op below threshold.
  pub async fn distill_session(&self, session_id: &str) -> Result<DistillationOutcome, AppError> {
    let candidates = self.tier3.undistilled_episodes(session_id, 100).await?;

    if (candidates.len() as u64) < self.episode_threshold {
      return Ok(DistillationOutcome {
        session_id: session_id.to_owned(),
        document_id: None,
        episodes_folded: 0,
        superseded_document_id: None,
      });
    }

    let synthesis = self.synthesize(&candidates).await?;
    let conflicts = self.tier4.find_by_title_overlap(&synthesis.title, 3).await?;

    let mut superseded_document_id = None;
    let mut confidence = synthesis.confidence_score.clamp(0.0, 1.0);

    if let Some(existing) = conflicts.into_iter().next() {
      let judgement = self.judge_conflict(&synthesis, &existing).await?;

      if judgement.hard_conflict {
        tracing::info!(
          existing_id = %existing.id,
          reasoning = %judgement.reasoning,
          "distillation superseding conflicting knowledge document"
        );
        self.tier4.mark_stale(existing.id).await?;
        superseded_document_id = Some(existing.id);
      } else {
        // Compatible overlap: lean on the existing confidence as a prior
        // rather than starting the new document from scratch.
        confidence = ((confidence + existing.confidence_score) / 2.0).clamp(0.0, 1.0);
        self.tier4.adjust_confidence(existing.id, (existing.confidence_score * 1.05).min(1.0)).await?;
      }
    }

    let now = Utc::now();
    let document_id = Uuid::now_v7();
    let model = knowledge_document::Model {
      id: document_id,
      title: synthesis.title,
      content: synthesis.content,
      knowledge_type: synthesis.knowledge_type,
      confidence_score: confidence,
      episode_count: candidates.len() as i32,
      distilled_at: now.into(),
      access_count: 0,
      usefulness_score: 0.0,
      validation_count: 0,
      stale: false,
    };
    self.tier4.store(model).await?;

    let episode_ids: Vec<Uuid> = candidates.iter().map(|e| e.id).collect();
    self.tier3.mark_distilled(&episode_ids).await?;

    self
      .bus
      .publish(
        "knowledge_distilled",
        session_id,
        json!({
          "document_id": document_id,
          "episodes_folded": episode_ids.len(),
          "superseded_document_id": superseded_document_id,
        }),
      )
      .await;

    Ok(DistillationOutcome {
      session_id: session_id.to_owned(),
      document_id: Some(document_id),
      episodes_folded: episode_ids.len(),
      superseded_document_id,
    })
  }

  async fn synthesize(&self, episodes: &[episode::Model]) -> Result<KnowledgeSynthesis, AppError> {
    let mut transcript = String::new();
    for ep in episodes {
      transcript.push_str(&format!("- {}\n", ep.summary));
    }

    let system = ChatCompletionRequestSystemMessage::from(SYNTHESIS_SYSTEM_PROMPT);
    let user = ChatCompletionRequestUserMessage::from(transcript);
    let output = generate_object::<KnowledgeSynthesis>(
      vec![
        ChatCompletionRequestMessage::System(system),
        ChatCompletionRequestMessage::User(user),
      ],
      "knowledge_distillation".to_owned(),
      Some("Distill a cluster of episodes into one durable knowledge document".to_owned()),
    )
    .await?;
    Ok(output.value)
  }

  async fn judge_conflict(
    &self,
    incoming: &KnowledgeSynthesis,
    existing: &knowledge_document::Model,
  ) -> Result<ConflictJudgement, AppError> {
    let prompt = format!(
      "Existing document:\nTitle: {}\nContent: {}\n\n\
       New document:\nTitle: {}\nContent: {}",
      existing.title, existing.content, incoming.title, incoming.content
    );

    let system = ChatCompletionRequestSystemMessage::from(CONFLICT_SYSTEM_PROMPT);
    let user = ChatCompletionRequestUserMessage::from(prompt);
    let output = generate_object::<ConflictJudgement>(
      vec![
        ChatCompletionRequestMessage::System(system),
        ChatCompletionRequestMessage::User(user),
      ],
      "knowledge_conflict_judgement".to_owned(),
      Some("Decide whether a new knowledge document contradicts an existing one".to_owned()),
    )
    .await?;
    Ok(output.value)
  }
}
