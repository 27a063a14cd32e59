//! CIAR: the composite significance score a fact carries through L2.
//!
//! `ciar_score = certainty * impact * age_decay(days_old) * recency_boost(access_count)`,
//! clamped into `[0, 1]` after multiplication. The curves are authored, not
//! learned: `age_decay` is a half-life decay and `recency_boost` is a
//! saturating gain, so the product of all four factors cannot exceed `1.3`
//! and clamping only ever pulls a high score down, never raises a low one.

/// Half-life, in days, of `age_decay`.
pub const HALF_LIFE_DAYS: f64 = 14.0;
/// Maximum gain `recency_boost` can contribute above `1.0`.
pub const RECENCY_GAIN: f64 = 0.3;

/// Strictly non-increasing in `days_old`; `1.0` at zero, asymptotic toward `0`.
pub fn age_decay(days_old: f64) -> f64 {
  0.5_f64.powf(days_old.max(0.0) / HALF_LIFE_DAYS)
}

/// Non-decreasing in `access_count`; `1.0` at zero, bounded above by `1.0 + RECENCY_GAIN`.
pub fn recency_boost(access_count: u32) -> f64 {
  1.0 + RECENCY_GAIN * (1.0 - 0.5_f64.powi(i32::try_from(access_count).unwrap_or(i32::MAX)))
}

/// The full composite score, clamped into `[0, 1]`.
pub fn ciar_score(certainty: f64, impact: f64, days_old: f64, access_count: u32) -> f64 {
  (certainty * impact * age_decay(days_old) * recency_boost(access_count)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn age_decay_is_one_at_zero_days() {
    assert!((age_decay(0.0) - 1.0).abs() < 1e-9);
  }

  #[test]
  fn age_decay_halves_at_half_life() {
    assert!((age_decay(HALF_LIFE_DAYS) - 0.5).abs() < 1e-9);
  }

  #[test]
  fn age_decay_never_negative_and_non_increasing() {
    let mut prev = age_decay(0.0);
    for days in [1.0, 7.0, 14.0, 30.0, 365.0] {
      let cur = age_decay(days);
      assert!(cur >= 0.0);
      assert!(cur <= prev);
      prev = cur;
    }
  }

  #[test]
  fn recency_boost_is_one_at_zero_access() {
    assert!((recency_boost(0) - 1.0).abs() < 1e-9);
  }

  #[test]
  fn recency_boost_is_non_decreasing_and_capped() {
    let mut prev = recency_boost(0);
    for n in 1..20 {
      let cur = recency_boost(n);
      assert!(cur >= prev);
      assert!(cur <= 1.0 + RECENCY_GAIN + 1e-9);
      prev = cur;
    }
  }

  #[test]
  fn ciar_score_clamped_into_unit_interval() {
    assert!((0.0..=1.0).contains(&ciar_score(1.0, 1.0, 0.0, 10)));
    assert_eq!(ciar_score(0.0, 1.0, 0.0, 0), 0.0);
  }

  #[test]
  fn ciar_score_at_threshold_is_promotable_not_exclusive() {
    // certainty/impact chosen so the product lands exactly on 0.6.
    let score = ciar_score(0.6, 1.0, 0.0, 0);
    assert!((score - 0.6).abs() < 1e-9);
    assert!(score >= 0.6);
  }
}
