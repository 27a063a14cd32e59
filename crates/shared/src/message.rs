use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
  User,
  Assistant,
  System,
}

impl fmt::Display for MessageRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::User => "user",
      Self::Assistant => "assistant",
      Self::System => "system",
    };
    write!(f, "{s}")
  }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
  pub role: MessageRole,
  pub content: String,
  pub timestamp: DateTime<Utc>,
}

impl Message {
  pub fn is_user(&self) -> bool {
    matches!(self.role, MessageRole::User)
  }

  pub fn is_assistant(&self) -> bool {
    matches!(self.role, MessageRole::Assistant)
  }
}

/// A single turn in L1, owned by the active-context tier.
///
/// Distinct from [`Message`]: a turn additionally carries its session and a
/// storage-level id so that a user turn and an assistant turn sharing the
/// same logical index never collide in the backing list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Turn {
  pub session_id: String,
  pub turn_id: String,
  pub role: MessageRole,
  pub content: String,
  pub timestamp: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Value>,
}

impl Turn {
  /// Storage id distinguishing the user and assistant half of one turn index.
  pub fn storage_id(session_id: &str, turn_index: u64, role: MessageRole) -> String {
    format!("{session_id}:{turn_index}:{role}")
  }
}
