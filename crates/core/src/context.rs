//! Context-block assembler: pulls the four tiers together into the prompt
//! context a turn is answered against. Standing-order `instruction` facts
//! render first as a high-priority block; the conversation window comes
//! next; everything else (working facts, episodic summaries, distilled
//! knowledge) renders after, since it is supporting recall rather than the
//! thread the user is actually in.

use std::sync::Arc;

use tetramem_ai::embed;
use tetramem_entities::{episode, fact, knowledge_document};
use tetramem_shared::{AppError, MessageRole, Turn};

use crate::tier1::ActiveContextTier;
use crate::tier2::WorkingMemoryTier;
use crate::tier3::EpisodicTier;
use crate::tier4::SemanticTier;

/// Conversation turns below this count are never trimmed for budget, even if
/// that means exceeding `max_context_tokens`: an agent needs at least a
/// handful of turns of immediate history to stay coherent.
const MIN_TURNS_KEPT: usize = 10;

/// Rough token estimate (chars / 4) — good enough for a trim budget, not
/// used for billing.
fn estimate_tokens(s: &str) -> u64 {
  (s.len() as u64).div_ceil(4)
}

#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
  pub instructions: Vec<fact::Model>,
  pub turns: Vec<Turn>,
  pub facts: Vec<fact::Model>,
  pub episodes: Vec<episode::Model>,
  pub knowledge: Vec<knowledge_document::Model>,
}

impl ContextBlock {
  /// Renders the block into the text a chat completion prompt is built
  /// around. Instructions first, then the conversation, then recall.
  pub fn render(&self) -> String {
    let mut out = String::new();

    if !self.instructions.is_empty() {
      out.push_str("# Standing instructions\n");
      for f in &self.instructions {
        out.push_str("- ");
        out.push_str(&f.content);
        out.push('\n');
      }
      out.push('\n');
    }

    out.push_str("# Conversation\n");
    for turn in &self.turns {
      out.push_str(&format!("{}: {}\n", turn.role, turn.content));
    }
    out.push('\n');

    if !self.facts.is_empty() {
      out.push_str("# Known facts\n");
      for f in &self.facts {
        out.push_str("- ");
        out.push_str(&f.content);
        out.push('\n');
      }
      out.push('\n');
    }

    if !self.episodes.is_empty() {
      out.push_str("# Related past episodes\n");
      for ep in &self.episodes {
        out.push_str("- ");
        out.push_str(&ep.summary);
        out.push('\n');
      }
      out.push('\n');
    }

    if !self.knowledge.is_empty() {
      out.push_str("# Distilled knowledge\n");
      for doc in &self.knowledge {
        out.push_str(&format!("- {}: {}\n", doc.title, doc.content));
      }
    }

    out
  }
}

pub struct ContextAssembler {
  tier1: Arc<ActiveContextTier>,
  tier2: Arc<WorkingMemoryTier>,
  tier3: Arc<EpisodicTier>,
  tier4: Arc<SemanticTier>,
}

impl ContextAssembler {
  pub fn new(tier1: Arc<ActiveContextTier>, tier2: Arc<WorkingMemoryTier>, tier3: Arc<EpisodicTier>, tier4: Arc<SemanticTier>) -> Self {
    Self { tier1, tier2, tier3, tier4 }
  }

  pub async fn assemble(
    &self,
    session_id: &str,
    min_ciar: f32,
    max_turns: u64,
    max_facts: u64,
    max_context_tokens: u64,
  ) -> Result<ContextBlock, AppError> {
    let all_turns = self.tier1.retrieve_session(session_id).await?;
    let mut turns = tail(all_turns, max_turns as usize);

    let facts = self.tier2.query_by_session(session_id, min_ciar, max_facts).await?;
    let instructions = self.standing_instructions(session_id, min_ciar).await?;

    let (mut episodes, mut knowledge) = (Vec::new(), Vec::new());
    if let Some(latest_user_text) = turns.iter().rev().find(|t| matches!(t.role, MessageRole::User)).map(|t| t.content.clone()) {
      let embedding = embed(&latest_user_text).await?;
      episodes = self.tier3.search_similar(&embedding, Some(session_id), 3).await?.into_iter().map(|(ep, _)| ep).collect();
      knowledge = self.tier4.search(&latest_user_text, None, 3).await?;
    }

    trim_to_budget(&mut turns, &instructions, &facts, &episodes, &knowledge, max_context_tokens);

    Ok(ContextBlock {
      instructions,
      turns,
      facts,
      episodes,
      knowledge,
    })
  }

  /// `instruction`-typed facts at or above `min_ciar`, with superseded
  /// entries (referenced by another instruction fact's `supersedes_fact_id`)
  /// dropped — only the live standing order for each category survives.
  async fn standing_instructions(&self, session_id: &str, min_ciar: f32) -> Result<Vec<fact::Model>, AppError> {
    let all = self.tier2.instruction_facts(session_id).await?;
    let superseded: std::collections::HashSet<uuid::Uuid> = all.iter().filter_map(|f| f.supersedes_fact_id).collect();
    Ok(
      all
        .into_iter()
        .filter(|f| f.ciar_score >= min_ciar && !superseded.contains(&f.id))
        .collect(),
    )
  }
}

fn tail(mut turns: Vec<Turn>, max_turns: usize) -> Vec<Turn> {
  if turns.len() > max_turns {
    turns = turns.split_off(turns.len() - max_turns);
  }
  turns
}

/// Drops the oldest turns first until the rendered context fits
/// `max_context_tokens`, never going below `MIN_TURNS_KEPT`.
fn trim_to_budget(
  turns: &mut Vec<Turn>,
  instructions: &[fact::Model],
  facts: &[fact::Model],
  episodes: &[episode::Model],
  knowledge: &[knowledge_document::Model],
  max_context_tokens: u64,
) {
  let fixed_tokens: u64 = instructions.iter().map(|f| estimate_tokens(&f.content))
    .chain(facts.iter().map(|f| estimate_tokens(&f.content)))
    .chain(episodes.iter().map(|e| estimate_tokens(&e.summary)))
    .chain(knowledge.iter().map(|k| estimate_tokens(&k.content)))
    .sum();

  while turns.len() > MIN_TURNS_KEPT {
    let turn_tokens: u64 = turns.iter().map(|t| estimate_tokens(&t.content)).sum();
    if fixed_tokens + turn_tokens <= max_context_tokens {
      break;
    }
    turns.remove(0);
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;

  fn turn(content: &str) -> Turn {
    Turn {
      session_id: "s1".to_owned(),
      turn_id: uuid::Uuid::now_v7().to_string(),
      role: MessageRole::User,
      content: content.to_owned(),
      timestamp: Utc::now(),
      metadata: None,
    }
  }

  #[test]
  fn tail_keeps_the_most_recent() {
    let turns = (0..5).map(|i| turn(&i.to_string())).collect();
    let kept = tail(turns, 2);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].content, "3");
    assert_eq!(kept[1].content, "4");
  }

  #[test]
  fn tail_is_a_no_op_under_the_cap() {
    let turns = (0..2).map(|i| turn(&i.to_string())).collect();
    let kept = tail(turns, 5);
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn trim_never_drops_below_the_floor() {
    let mut turns: Vec<Turn> = (0..20).map(|i| turn(&"x".repeat(1000) + &i.to_string())).collect();
    trim_to_budget(&mut turns, &[], &[], &[], &[], 1);
    assert_eq!(turns.len(), MIN_TURNS_KEPT);
  }

  #[test]
  fn trim_is_a_no_op_within_budget() {
    let mut turns: Vec<Turn> = (0..15).map(|i| turn(&i.to_string())).collect();
    trim_to_budget(&mut turns, &[], &[], &[], &[], 1_000_000);
    assert_eq!(turns.len(), 15);
  }
}
