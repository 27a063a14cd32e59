use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;

/// A deadline threaded from a request handler into every downstream call it
/// makes, so a slow storage backend or LLM provider cannot hold a connection
/// open past the caller's own timeout budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
  #[must_use]
  pub fn after(duration: Duration) -> Self {
    Self(Instant::now() + duration)
  }

  #[must_use]
  pub fn remaining(&self) -> Duration {
    self.0.saturating_duration_since(Instant::now())
  }

  #[must_use]
  pub fn has_passed(&self) -> bool {
    Instant::now() >= self.0
  }

  /// Runs `fut` to completion, or fails with a 504 `AppError` if it does not
  /// finish before the deadline.
  pub async fn guard<F, T>(&self, fut: F) -> Result<T, AppError>
  where
    F: std::future::Future<Output = Result<T, AppError>>,
  {
    match tokio::time::timeout(self.remaining(), fut).await {
      Ok(result) => result,
      Err(_) => Err(AppError::with_status(axum::http::StatusCode::GATEWAY_TIMEOUT, anyhow::anyhow!("deadline exceeded"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn remaining_floors_at_zero_once_passed() {
    let deadline = Deadline::after(Duration::from_millis(0));
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(deadline.remaining(), Duration::ZERO);
    assert!(deadline.has_passed());
  }

  #[tokio::test]
  async fn guard_passes_through_a_fast_future() {
    let deadline = Deadline::after(Duration::from_secs(5));
    let result = deadline.guard(async { Ok::<_, AppError>(42) }).await.unwrap();
    assert_eq!(result, 42);
  }

  #[tokio::test]
  async fn guard_times_out_a_slow_future() {
    let deadline = Deadline::after(Duration::from_millis(10));
    let result = deadline
      .guard(async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, AppError>(())
      })
      .await;
    assert!(result.is_err());
  }
}
