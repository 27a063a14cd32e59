//! Hash-tag key generation for Redis Cluster safety.
//!
//! Hash tags guarantee that related keys colocate to the same cluster slot,
//! which is what lets [`crate::script`] run multi-key atomic operations per
//! session.
//!
//! Key shapes:
//! - Session keys: `{session:<id>}:<resource>`
//! - Global keys:  `{mas}:<resource>`

/// Pure-function key generator. All methods are associated functions so
/// callers never need to instantiate this type.
pub struct NamespaceManager;

impl NamespaceManager {
  /// L1 conversation turns: `{session:<id>}:turns`.
  pub fn l1_turns(session_id: &str) -> String {
    format!("{{session:{session_id}}}:turns")
  }

  /// Per-agent scratchpad state: `{session:<id>}:agent:<agent_id>:state`.
  pub fn personal_state(session_id: &str, agent_id: &str) -> String {
    format!("{{session:{session_id}}}:agent:{agent_id}:state")
  }

  /// Shared multi-agent workspace: `{session:<id>}:workspace`.
  pub fn shared_workspace(session_id: &str) -> String {
    format!("{{session:{session_id}}}:workspace")
  }

  /// L2 fact-id index set: `{session:<id>}:facts:index`.
  pub fn l2_facts_index(session_id: &str) -> String {
    format!("{{session:{session_id}}}:facts:index")
  }

  /// Session-local promotion lease: `{session:<id>}:promotion:lease`.
  pub fn promotion_lease(session_id: &str) -> String {
    format!("{{session:{session_id}}}:promotion:lease")
  }

  /// Global lifecycle event stream: `{mas}:lifecycle`. Not session-scoped.
  pub fn lifecycle_stream() -> &'static str {
    "{mas}:lifecycle"
  }

  /// Global tracked-session set: `{mas}:sessions`. The session wall adds to
  /// this on first turn and removes on reset/cleanup; the wake-up sweep
  /// walks it to decide which sessions to check for promotion/consolidation.
  pub fn tracked_sessions() -> &'static str {
    "{mas}:sessions"
  }

  /// Global last-turn-activity timestamp: `{mas}:last_activity`. The session
  /// wall refreshes this on every successfully completed turn; the worker's
  /// stuck-run watchdog polls it.
  pub fn last_activity() -> &'static str {
    "{mas}:last_activity"
  }

  /// The substring between the first matching `{` `}` pair, i.e. the part
  /// the cluster actually hashes. Returns the whole key if it carries no tag.
  pub fn hash_tag(key: &str) -> &str {
    match (key.find('{'), key.find('}')) {
      (Some(open), Some(close)) if close > open => &key[open + 1..close],
      _ => key,
    }
  }

  /// Cluster slot for a key, computed as CRC16/XMODEM over its hash tag,
  /// modulo 16384 — the same algorithm Redis Cluster itself uses.
  pub fn compute_slot(key: &str) -> u16 {
    crc16_xmodem(Self::hash_tag(key).as_bytes()) % 16384
  }
}

/// CRC16/XMODEM (poly 0x1021, init 0x0000), matching `binascii.crc_hqx`.
fn crc16_xmodem(data: &[u8]) -> u16 {
  let mut crc: u16 = 0;
  for &byte in data {
    crc ^= u16::from(byte) << 8;
    for _ in 0..8 {
      crc = if crc & 0x8000 != 0 {
        (crc << 1) ^ 0x1021
      } else {
        crc << 1
      };
    }
  }
  crc
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn l1_turns_key_shape() {
    assert_eq!(NamespaceManager::l1_turns("abc123"), "{session:abc123}:turns");
  }

  #[test]
  fn lifecycle_stream_is_global() {
    assert_eq!(NamespaceManager::lifecycle_stream(), "{mas}:lifecycle");
  }

  #[test]
  fn prefix_is_idempotent_shape() {
    // apply_prefix(apply_prefix(id)) == apply_prefix(id)
    fn apply_prefix(prefix: &str, id: &str) -> String {
      if id.starts_with(&format!("{prefix}:")) {
        id.to_owned()
      } else {
        format!("{prefix}:{id}")
      }
    }
    let once = apply_prefix("full", "abc");
    let twice = apply_prefix("full", &once);
    assert_eq!(once, "full:abc");
    assert_eq!(once, twice);
  }

  #[test]
  fn all_session_scoped_keys_share_one_slot() {
    let session_id = "session-xyz-789";
    let keys = [
      NamespaceManager::l1_turns(session_id),
      NamespaceManager::personal_state(session_id, "agent-1"),
      NamespaceManager::shared_workspace(session_id),
      NamespaceManager::l2_facts_index(session_id),
      NamespaceManager::promotion_lease(session_id),
    ];

    let first_slot = NamespaceManager::compute_slot(&keys[0]);
    for key in &keys[1..] {
      assert_eq!(
        NamespaceManager::compute_slot(key),
        first_slot,
        "key {key} landed on a different slot than {}",
        keys[0]
      );
    }
  }

  #[test]
  fn crc16_xmodem_matches_known_vector() {
    // "123456789" -> 0x31C3 is the standard XMODEM check value.
    assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
  }
}
