//! Agent variants: three policies sharing the same tier set, modeled as a
//! closed enum rather than a trait-object hierarchy — there is no dynamic
//! dispatch surface a caller could extend, by design.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tetramem_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, TokenUsage, generate_text,
};
use tetramem_entities::{episode, fact, knowledge_document};
use tetramem_shared::{AppError, Message, MessageRole, Turn};
use uuid::Uuid;

use crate::context::ContextAssembler;
use crate::promotion::PromotionEngine;
use crate::tier1::ActiveContextTier;
use crate::tier3::EpisodicTier;
use crate::tier4::SemanticTier;

const SYSTEM_PROMPT: &str = "\
You are a helpful assistant with access to the user's prior conversation \
history and, where relevant, durable facts, past episodes, and distilled \
knowledge about them. Use this context naturally; do not mention that you \
have a memory system unless the user asks about it directly.";

const FULL_CONTEXT_DEFAULT_BUDGET: u64 = 120_000;
const FULL_CONTEXT_MIN_TURNS_KEPT: usize = 10;

/// Per-turn state, threaded through the five-node pipeline and returned to
/// the caller for logging/inspection.
#[derive(Debug, Clone)]
pub struct TurnState {
  pub messages: Vec<Message>,
  pub session_id: String,
  pub turn_id: String,
  pub metadata: Option<Value>,
  pub active_context: Vec<Turn>,
  pub working_facts: Vec<fact::Model>,
  pub episodic_chunks: Vec<episode::Model>,
  pub semantic_knowledge: Vec<knowledge_document::Model>,
  pub response: Option<String>,
  /// Provider/model that actually answered and its token usage, as reported
  /// by the unified LLM client — not estimated, since the caller (the HTTP
  /// surface) must report real usage.
  pub provider: Option<String>,
  pub model: Option<String>,
  pub usage: Option<TokenUsage>,
}

impl TurnState {
  fn new(session_id: &str, turn_id: &str, metadata: Option<Value>) -> Self {
    Self {
      messages: Vec::new(),
      session_id: session_id.to_owned(),
      turn_id: turn_id.to_owned(),
      metadata,
      active_context: Vec::new(),
      working_facts: Vec::new(),
      episodic_chunks: Vec::new(),
      semantic_knowledge: Vec::new(),
      response: None,
      provider: None,
      model: None,
      usage: None,
    }
  }
}

pub struct MemoryAgent {
  tier1: Arc<ActiveContextTier>,
  context: Arc<ContextAssembler>,
  promotion: Arc<PromotionEngine>,
  min_ciar: f32,
  max_turns: u64,
  max_facts: u64,
  max_context_tokens: u64,
  promotion_threshold: f64,
}

impl MemoryAgent {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    tier1: Arc<ActiveContextTier>,
    context: Arc<ContextAssembler>,
    promotion: Arc<PromotionEngine>,
    min_ciar: f32,
    max_turns: u64,
    max_facts: u64,
    max_context_tokens: u64,
    promotion_threshold: f64,
  ) -> Self {
    Self {
      tier1,
      context,
      promotion,
      min_ciar,
      max_turns,
      max_facts,
      max_context_tokens,
      promotion_threshold,
    }
  }

  async fn handle_turn(&self, session_id: &str, turn_id: &str, user_content: &str, metadata: Option<Value>) -> Result<TurnState, AppError> {
    let mut state = TurnState::new(session_id, turn_id, metadata.clone());
    let now = Utc::now();

    // perceive
    let user_turn = Turn {
      session_id: session_id.to_owned(),
      turn_id: Turn::storage_id(session_id, turn_index(turn_id), MessageRole::User),
      role: MessageRole::User,
      content: user_content.to_owned(),
      timestamp: now,
      metadata: metadata.clone(),
    };
    self.tier1.store(&user_turn).await?;

    // retrieve
    let block = self.context.assemble(session_id, self.min_ciar, self.max_turns, self.max_facts, self.max_context_tokens).await?;
    state.active_context = block.turns.clone();
    state.working_facts = block.facts.clone();
    state.episodic_chunks = block.episodes.clone();
    state.semantic_knowledge = block.knowledge.clone();

    // reason
    let system = ChatCompletionRequestSystemMessage::from(format!("{SYSTEM_PROMPT}\n\n{}", block.render()));
    let user = ChatCompletionRequestUserMessage::from(user_content.to_owned());
    let completion = generate_text(vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ])
    .await?;

    // update: write both halves of the turn, schedule promotion in the background
    let assistant_turn = Turn {
      session_id: session_id.to_owned(),
      turn_id: Turn::storage_id(session_id, turn_index(turn_id), MessageRole::Assistant),
      role: MessageRole::Assistant,
      content: completion.text.clone(),
      timestamp: Utc::now(),
      metadata: None,
    };
    self.tier1.store(&assistant_turn).await?;

    let promotion = Arc::clone(&self.promotion);
    let session_id_owned = session_id.to_owned();
    let threshold = self.promotion_threshold;
    tokio::spawn(async move {
      if let Err(err) = promotion.promote_session(&session_id_owned, threshold).await {
        tracing::warn!(session_id = %session_id_owned, error = %err, "background promotion failed");
      }
    });

    state.messages = vec![
      Message { role: MessageRole::User, content: user_content.to_owned(), timestamp: now },
      Message { role: MessageRole::Assistant, content: completion.text.clone(), timestamp: Utc::now() },
    ];

    // respond
    state.provider = Some(completion.provider);
    state.model = Some(completion.model);
    state.usage = completion.usage;
    state.response = Some(completion.text);
    Ok(state)
  }
}

/// Retrieval-augmented variant. Reads (never writes) L3 and L4 for similar
/// episodes/documents to ground the response; conversation turns go to L1
/// only, since L1 is not part of the "no L2/L3/L4 write-back" restriction.
pub struct RagAgent {
  tier1: Arc<ActiveContextTier>,
  tier3: Arc<EpisodicTier>,
  tier4: Arc<SemanticTier>,
  max_turns: u64,
}

impl RagAgent {
  pub fn new(tier1: Arc<ActiveContextTier>, tier3: Arc<EpisodicTier>, tier4: Arc<SemanticTier>, max_turns: u64) -> Self {
    Self { tier1, tier3, tier4, max_turns }
  }

  async fn handle_turn(&self, session_id: &str, turn_id: &str, user_content: &str, metadata: Option<Value>) -> Result<TurnState, AppError> {
    let mut state = TurnState::new(session_id, turn_id, metadata.clone());
    let now = Utc::now();

    let user_turn = Turn {
      session_id: session_id.to_owned(),
      turn_id: Turn::storage_id(session_id, turn_index(turn_id), MessageRole::User),
      role: MessageRole::User,
      content: user_content.to_owned(),
      timestamp: now,
      metadata,
    };
    self.tier1.store(&user_turn).await?;

    let mut recent = self.tier1.retrieve_session(session_id).await?;
    if recent.len() > self.max_turns as usize {
      recent = recent.split_off(recent.len() - self.max_turns as usize);
    }
    state.active_context = recent.clone();

    let embedding = tetramem_ai::embed(user_content).await?;
    state.episodic_chunks = self.tier3.search_similar(&embedding, None, 3).await?.into_iter().map(|(ep, _)| ep).collect();
    state.semantic_knowledge = self.tier4.search(user_content, None, 3).await?;

    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\n# Retrieved context\n");
    for ep in &state.episodic_chunks {
      prompt.push_str("- ");
      prompt.push_str(&ep.summary);
      prompt.push('\n');
    }
    for doc in &state.semantic_knowledge {
      prompt.push_str(&format!("- {}: {}\n", doc.title, doc.content));
    }

    let system = ChatCompletionRequestSystemMessage::from(prompt);
    let user = ChatCompletionRequestUserMessage::from(user_content.to_owned());
    let completion = generate_text(vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ])
    .await?;

    let assistant_turn = Turn {
      session_id: session_id.to_owned(),
      turn_id: Turn::storage_id(session_id, turn_index(turn_id), MessageRole::Assistant),
      role: MessageRole::Assistant,
      content: completion.text.clone(),
      timestamp: Utc::now(),
      metadata: None,
    };
    self.tier1.store(&assistant_turn).await?;

    state.messages = vec![
      Message { role: MessageRole::User, content: user_content.to_owned(), timestamp: now },
      Message { role: MessageRole::Assistant, content: completion.text.clone(), timestamp: Utc::now() },
    ];
    state.provider = Some(completion.provider);
    state.model = Some(completion.model);
    state.usage = completion.usage;
    state.response = Some(completion.text);
    Ok(state)
  }
}

/// Pulls the largest context window the model allows and answers with no
/// tiered retrieval at all — the baseline a Memory/RAG variant is compared
/// against.
pub struct FullContextAgent {
  tier1: Arc<ActiveContextTier>,
  max_context_tokens: u64,
}

impl FullContextAgent {
  pub fn new(tier1: Arc<ActiveContextTier>, max_context_tokens: Option<u64>) -> Self {
    Self {
      tier1,
      max_context_tokens: max_context_tokens.unwrap_or(FULL_CONTEXT_DEFAULT_BUDGET),
    }
  }

  async fn handle_turn(&self, session_id: &str, turn_id: &str, user_content: &str, metadata: Option<Value>) -> Result<TurnState, AppError> {
    let mut state = TurnState::new(session_id, turn_id, metadata.clone());
    let now = Utc::now();

    let user_turn = Turn {
      session_id: session_id.to_owned(),
      turn_id: Turn::storage_id(session_id, turn_index(turn_id), MessageRole::User),
      role: MessageRole::User,
      content: user_content.to_owned(),
      timestamp: now,
      metadata,
    };
    self.tier1.store(&user_turn).await?;

    let mut turns = self.tier1.retrieve_session(session_id).await?;
    truncate_to_budget(&mut turns, self.max_context_tokens);
    state.active_context = turns.clone();

    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\n# Conversation\n");
    for t in &turns {
      prompt.push_str(&format!("{}: {}\n", t.role, t.content));
    }

    let system = ChatCompletionRequestSystemMessage::from(prompt);
    let user = ChatCompletionRequestUserMessage::from(user_content.to_owned());
    let completion = generate_text(vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ])
    .await?;

    let assistant_turn = Turn {
      session_id: session_id.to_owned(),
      turn_id: Turn::storage_id(session_id, turn_index(turn_id), MessageRole::Assistant),
      role: MessageRole::Assistant,
      content: completion.text.clone(),
      timestamp: Utc::now(),
      metadata: None,
    };
    self.tier1.store(&assistant_turn).await?;

    state.messages = vec![
      Message { role: MessageRole::User, content: user_content.to_owned(), timestamp: now },
      Message { role: MessageRole::Assistant, content: completion.text.clone(), timestamp: Utc::now() },
    ];
    state.provider = Some(completion.provider);
    state.model = Some(completion.model);
    state.usage = completion.usage;
    state.response = Some(completion.text);
    Ok(state)
  }
}

pub enum Agent {
  Memory(MemoryAgent),
  Rag(RagAgent),
  FullContext(FullContextAgent),
}

impl Agent {
  pub fn variant_name(&self) -> &'static str {
    match self {
      Agent::Memory(_) => "memory",
      Agent::Rag(_) => "rag",
      Agent::FullContext(_) => "full_context",
    }
  }

  pub async fn handle_turn(&self, session_id: &str, turn_id: &str, user_content: &str, metadata: Option<Value>) -> Result<TurnState, AppError> {
    match self {
      Agent::Memory(agent) => agent.handle_turn(session_id, turn_id, user_content, metadata).await,
      Agent::Rag(agent) => agent.handle_turn(session_id, turn_id, user_content, metadata).await,
      Agent::FullContext(agent) => agent.handle_turn(session_id, turn_id, user_content, metadata).await,
    }
  }
}

fn turn_index(turn_id: &str) -> u64 {
  turn_id.parse().unwrap_or_else(|_| Uuid::now_v7().as_u128() as u64)
}

fn estimate_tokens(s: &str) -> u64 {
  (s.len() as u64).div_ceil(4)
}

fn truncate_to_budget(turns: &mut Vec<Turn>, max_context_tokens: u64) {
  while turns.len() > FULL_CONTEXT_MIN_TURNS_KEPT {
    let total: u64 = turns.iter().map(|t| estimate_tokens(&t.content)).sum();
    if total <= max_context_tokens {
      break;
    }
    turns.remove(0);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn turn(content: &str) -> Turn {
    Turn {
      session_id: "s1".to_owned(),
      turn_id: Uuid::now_v7().to_string(),
      role: MessageRole::User,
      content: content.to_owned(),
      timestamp: Utc::now(),
      metadata: None,
    }
  }

  #[test]
  fn truncate_respects_the_floor() {
    let mut turns: Vec<Turn> = (0..30).map(|i| turn(&"x".repeat(500) + &i.to_string())).collect();
    truncate_to_budget(&mut turns, 10);
    assert_eq!(turns.len(), FULL_CONTEXT_MIN_TURNS_KEPT);
  }

  #[test]
  fn truncate_is_a_no_op_within_budget() {
    let mut turns: Vec<Turn> = (0..15).map(|i| turn(&i.to_string())).collect();
    truncate_to_budget(&mut turns, 1_000_000);
    assert_eq!(turns.len(), 15);
  }

}
