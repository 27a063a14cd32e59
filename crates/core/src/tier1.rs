//! L1 Active Context: raw conversation turns, backed by `tetramem_kv`.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tetramem_kv::{NamespaceManager, ScriptManager};
use tetramem_shared::{AppError, Turn, ids};

use crate::ciar::ciar_score;

pub struct ActiveContextTier {
  conn: ConnectionManager,
  scripts: ScriptManager,
  window_size: u64,
  ttl_seconds: u64,
}

impl ActiveContextTier {
  pub fn new(conn: ConnectionManager, window_size: u64, ttl_hours: u64) -> Self {
    Self {
      conn,
      scripts: ScriptManager::new(),
      window_size,
      ttl_seconds: ttl_hours * 3600,
    }
  }

  /// Append a turn via smart append (push, trim to `window_size`, refresh TTL).
  ///
  /// The stored JSON carries, alongside the turn's own fields, a top-level
  /// `fact_id`/`ciar_score` pair the atomic-promotion script reads directly:
  /// a placeholder derived under `fact_type = "turn"` and a cheap pre-score
  /// (certainty = impact = 1.0, no age/access signal yet — the turn was just
  /// appended). This is a coarse candidate filter, not the real score a
  /// promoted fact carries; see `promotion` for the two-phase rationale.
  /// Returns the list length after the push.
  pub async fn store(&self, turn: &Turn) -> Result<u64, AppError> {
    let key = NamespaceManager::l1_turns(&turn.session_id);
    let mut item = serde_json::to_value(turn)?;
    let placeholder_id = ids::fact_id(&turn.session_id, &turn.content, "turn");
    let pre_score = ciar_score(1.0, 1.0, 0.0, 0);
    item["fact_id"] = serde_json::Value::String(placeholder_id.to_string());
    item["ciar_score"] = serde_json::json!(pre_score);

    let mut conn = self.conn.clone();
    Ok(
      self
        .scripts
        .execute_smart_append(&mut conn, &key, &item, self.window_size, self.ttl_seconds)
        .await?,
    )
  }

  /// Current window, oldest-first (the append path pushes to the head, so
  /// the raw list is newest-first; this flips it for natural conversation
  /// order).
  pub async fn retrieve_session(&self, session_id: &str) -> Result<Vec<Turn>, AppError> {
    let key = NamespaceManager::l1_turns(session_id);
    let mut conn = self.conn.clone();
    let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;
    let mut turns = raw
      .iter()
      .map(|s| serde_json::from_str(s).map_err(AppError::new))
      .collect::<Result<Vec<Turn>, _>>()?;
    turns.reverse();
    Ok(turns)
  }

  /// Deletes the session's L1 list, returning the number of turns it held.
  pub async fn delete(&self, session_id: &str) -> Result<u64, AppError> {
    let key = NamespaceManager::l1_turns(session_id);
    let mut conn = self.conn.clone();
    let len: u64 = conn.llen(&key).await?;
    let _: () = conn.del(&key).await?;
    Ok(len)
  }

  pub async fn health_check(&self) -> Result<(), AppError> {
    let mut conn = self.conn.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
  }
}
