//! Stuck-run watchdog: trips if no turn has completed within the configured
//! window. The session wall refreshes `{mas}:last_activity` on every
//! successfully completed turn; this task only ever reads it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tetramem_kv::NamespaceManager;
use tetramem_shared::AppError;

/// Polling cadence is a fraction of the timeout window so a trip is detected
/// promptly without hammering Redis.
fn poll_interval(timeout: Duration) -> Duration {
  (timeout / 4).max(Duration::from_secs(5))
}

/// Runs until a stuck run is detected, at which point it logs a structured
/// error artifact and returns `Err` — the caller is expected to treat this
/// as fatal and exit the process non-zero.
pub async fn run_watchdog(mut redis: ConnectionManager, timeout: Duration) -> Result<(), AppError> {
  let mut ticker = tokio::time::interval(poll_interval(timeout));

  loop {
    ticker.tick().await;

    let raw: Option<String> = redis.get(NamespaceManager::last_activity()).await?;
    let Some(raw) = raw else {
      // No turn has ever completed yet; nothing to watch.
      continue;
    };

    let Ok(last_activity) = DateTime::parse_from_rfc3339(&raw) else {
      tracing::warn!(raw, "watchdog found an unparseable last-activity timestamp");
      continue;
    };
    let last_activity = last_activity.with_timezone(&Utc);
    let idle = Utc::now().signed_duration_since(last_activity);

    if idle.to_std().unwrap_or_default() > timeout {
      tracing::error!(
        last_activity = %last_activity.to_rfc3339(),
        idle_seconds = idle.num_seconds(),
        timeout_seconds = timeout.as_secs(),
        "stuck-run watchdog tripped: no turn activity within the configured window"
      );
      return Err(AppError::new(anyhow::anyhow!(
        "stuck-run watchdog tripped after {}s idle (timeout {}s)",
        idle.num_seconds(),
        timeout.as_secs(),
      )));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn poll_interval_is_a_quarter_of_timeout() {
    assert_eq!(poll_interval(Duration::from_secs(60)), Duration::from_secs(15));
  }

  #[test]
  fn poll_interval_has_a_floor() {
    assert_eq!(poll_interval(Duration::from_secs(1)), Duration::from_secs(5));
  }
}
