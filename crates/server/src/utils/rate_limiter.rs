//! Process-wide token-bucket budget for the session wall, per §5's
//! "shared token-bucket per process (via `governor`)". Callers await the
//! budget rather than being rejected; a failed turn feeds its cost back in
//! as a penalty so a provider that keeps erroring does not get a full
//! refund of the capacity it just burned.

use std::num::NonZeroU32;

use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter};

pub struct TokenBudget {
  limiter: RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>,
  clock: DefaultClock,
}

impl TokenBudget {
  pub fn new(tokens_per_minute: u32) -> Self {
    let quota = Quota::per_minute(NonZeroU32::new(tokens_per_minute.max(1)).unwrap());
    Self { limiter: RateLimiter::direct(quota), clock: DefaultClock::default() }
  }

  /// Suspends the caller until `cost` tokens are available. A cost larger
  /// than the bucket's entire burst capacity is let through immediately
  /// rather than blocking forever.
  pub async fn acquire(&self, cost: u32) {
    let Some(cost) = NonZeroU32::new(cost) else { return };
    loop {
      match self.limiter.check_n(cost) {
        Ok(Ok(())) => return,
        Ok(Err(not_until)) => {
          tokio::time::sleep(not_until.wait_time_from(self.clock.now())).await;
        }
        Err(_insufficient_capacity) => return,
      }
    }
  }

  /// Burns `cost` tokens without waiting, as a penalty for a turn that
  /// failed downstream after the budget was already spent planning it.
  pub fn penalize(&self, cost: u32) {
    if let Some(cost) = NonZeroU32::new(cost) {
      let _ = self.limiter.check_n(cost);
    }
  }
}
