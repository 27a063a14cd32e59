/// Applies the per-variant session prefix once. Idempotent: a session id
/// that already carries the prefix is returned unchanged, so a caller that
/// echoes back an id this wall already prefixed never double-prefixes it.
pub fn apply_prefix(prefix: &str, session_id: &str) -> String {
  let tag = format!("{prefix}:");
  if session_id.starts_with(&tag) {
    session_id.to_owned()
  } else {
    format!("{tag}{session_id}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefixes_a_bare_id() {
    assert_eq!(apply_prefix("memory", "abc"), "memory:abc");
  }

  #[test]
  fn is_idempotent() {
    let once = apply_prefix("memory", "abc");
    let twice = apply_prefix("memory", &once);
    assert_eq!(once, twice);
  }
}
