//! Bookkeeping against the two global keys the background engines read:
//! the tracked-session set the wake-up sweep walks, and the last-activity
//! timestamp the stuck-run watchdog polls.

use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tetramem_kv::NamespaceManager;
use tetramem_shared::AppError;

pub async fn track_session(redis: &ConnectionManager, session_id: &str) -> Result<(), AppError> {
  let mut conn = redis.clone();
  let _: () = conn.sadd(NamespaceManager::tracked_sessions(), session_id).await?;
  Ok(())
}

pub async fn untrack_session(redis: &ConnectionManager, session_id: &str) -> Result<(), AppError> {
  let mut conn = redis.clone();
  let _: () = conn.srem(NamespaceManager::tracked_sessions(), session_id).await?;
  Ok(())
}

pub async fn tracked_sessions(redis: &ConnectionManager) -> Result<Vec<String>, AppError> {
  let mut conn = redis.clone();
  Ok(conn.smembers(NamespaceManager::tracked_sessions()).await?)
}

pub async fn refresh_last_activity(redis: &ConnectionManager) -> Result<(), AppError> {
  let mut conn = redis.clone();
  let _: () = conn.set(NamespaceManager::last_activity(), Utc::now().to_rfc3339()).await?;
  Ok(())
}
