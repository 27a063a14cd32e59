//! Deterministic id derivation shared by the promotion engine and its tests.

use std::sync::LazyLock;

use uuid::Uuid;

/// Namespace all fact ids are derived under, itself a stable UUIDv5 so the
/// derivation is reproducible across processes and versions.
pub static FACT_ID_NAMESPACE: LazyLock<Uuid> =
  LazyLock::new(|| Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"tetramem.fact"));

/// `fact_id = deterministic_hash(session_id, content, fact_type)`.
///
/// Two extraction passes that produce the same claim text and type for the
/// same session always converge on the same id; this is what lets the
/// promotion engine's index-set check suppress duplicate insertion.
pub fn fact_id(session_id: &str, content: &str, fact_type: &str) -> Uuid {
  let key = format!("{session_id}\u{0}{content}\u{0}{fact_type}");
  Uuid::new_v5(&FACT_ID_NAMESPACE, key.as_bytes())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_input_same_id() {
    let a = fact_id("s1", "prefers blue", "preference");
    let b = fact_id("s1", "prefers blue", "preference");
    assert_eq!(a, b);
  }

  #[test]
  fn different_session_different_id() {
    let a = fact_id("s1", "prefers blue", "preference");
    let b = fact_id("s2", "prefers blue", "preference");
    assert_ne!(a, b);
  }

  #[test]
  fn different_type_different_id() {
    let a = fact_id("s1", "prefers blue", "preference");
    let b = fact_id("s1", "prefers blue", "observation");
    assert_ne!(a, b);
  }
}
