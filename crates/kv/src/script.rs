//! Loads, caches, and executes the three server-side Lua scripts.
//!
//! `redis::Script` already encodes the "try EVALSHA, on `NOSCRIPT` fall back
//! to EVAL and re-cache" policy internally, so the manager's job is just to
//! own one `Script` per operation and give each a typed call surface.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ATOMIC_PROMOTION_SRC: &str = include_str!("lua/atomic_promotion.lua");
const WORKSPACE_UPDATE_SRC: &str = include_str!("lua/workspace_update.lua");
const SMART_APPEND_SRC: &str = include_str!("lua/smart_append.lua");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotableTurn {
  pub turn_id: String,
  pub content: String,
  pub fact_id: String,
  pub ciar_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceUpdateMode {
  Replace,
  Merge,
}

impl WorkspaceUpdateMode {
  fn as_str(self) -> &'static str {
    match self {
      Self::Replace => "replace",
      Self::Merge => "merge",
    }
  }
}

/// Owns the compiled form of each script. Cheap to clone (`Script` is an
/// `Arc`-free value type wrapping just the source and its SHA1).
#[derive(Clone)]
pub struct ScriptManager {
  atomic_promotion: Script,
  workspace_update: Script,
  smart_append: Script,
}

impl Default for ScriptManager {
  fn default() -> Self {
    Self::new()
  }
}

impl ScriptManager {
  pub fn new() -> Self {
    Self {
      atomic_promotion: Script::new(ATOMIC_PROMOTION_SRC),
      workspace_update: Script::new(WORKSPACE_UPDATE_SRC),
      smart_append: Script::new(SMART_APPEND_SRC),
    }
  }

  /// Atomic L1→L2 promotion filter. Read-only with respect to the store.
  pub async fn execute_atomic_promotion(
    &self,
    conn: &mut ConnectionManager,
    l1_key: &str,
    l2_index_key: &str,
    ciar_threshold: f64,
    batch_size: u64,
  ) -> anyhow::Result<Vec<PromotableTurn>> {
    let raw: String = self
      .atomic_promotion
      .key(l1_key)
      .key(l2_index_key)
      .arg(ciar_threshold)
      .arg(batch_size)
      .invoke_async(conn)
      .await?;
    Ok(serde_json::from_str(&raw)?)
  }

  /// Version-checked workspace write. Returns `-1` on CAS mismatch.
  pub async fn execute_workspace_update(
    &self,
    conn: &mut ConnectionManager,
    workspace_key: &str,
    expected_version: i64,
    new_data: &Value,
    mode: WorkspaceUpdateMode,
  ) -> anyhow::Result<i64> {
    let version: i64 = self
      .workspace_update
      .key(workspace_key)
      .arg(expected_version)
      .arg(new_data.to_string())
      .arg(mode.as_str())
      .invoke_async(conn)
      .await?;
    Ok(version)
  }

  /// Push, trim, refresh TTL. Returns the final list length.
  pub async fn execute_smart_append(
    &self,
    conn: &mut ConnectionManager,
    list_key: &str,
    item: &Value,
    window_size: u64,
    ttl_seconds: u64,
  ) -> anyhow::Result<u64> {
    let len: u64 = self
      .smart_append
      .key(list_key)
      .arg(item.to_string())
      .arg(window_size)
      .arg(ttl_seconds)
      .invoke_async(conn)
      .await?;
    Ok(len)
  }

  /// Session-local promotion lease, acquired with `SET NX PX`.
  ///
  /// Not a Lua script (a single `SET` is already atomic); kept here because
  /// it shares the per-session concurrency story with the three scripts.
  pub async fn try_acquire_promotion_lease(
    conn: &mut ConnectionManager,
    lease_key: &str,
    ttl_ms: u64,
  ) -> anyhow::Result<bool> {
    let acquired: Option<String> = redis::cmd("SET")
      .arg(lease_key)
      .arg("1")
      .arg("NX")
      .arg("PX")
      .arg(ttl_ms)
      .query_async(conn)
      .await?;
    Ok(acquired.is_some())
  }

  pub async fn release_promotion_lease(
    conn: &mut ConnectionManager,
    lease_key: &str,
  ) -> anyhow::Result<()> {
    let _: () = conn.del(lease_key).await?;
    Ok(())
  }
}
