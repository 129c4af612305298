//! Nostr event model and canonical identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// The first element names the tag and the following elements hold data.
/// Filter updates carry at least:
///
/// - `d` – topic discriminator that scopes the replaceable document
/// - `version` – producer-assigned version string (informational)
/// - `t` – free-form hashtags (informational)
///
/// Tags are kept verbatim so unknown tags survive canonical serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name (first element), if any.
    pub fn key(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First data element, if any.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Signed filter-update event as received from a relay.
///
/// ```json
/// {
///   "id": "5c83...",
///   "pubkey": "79be...",
///   "kind": 30078,
///   "created_at": 1700000000,
///   "tags": [["d", "adablock-filters"], ["version", "1.0.1"]],
///   "content": "{\"version\":\"1.0.1\"}",
///   "sig": "e4f1..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 over the canonical serialization).
    pub id: String,
    /// Author public key (x-only, hex).
    pub pubkey: String,
    /// Event category, `30078` for filter updates.
    pub kind: u32,
    /// Signer-claimed Unix timestamp in seconds.
    pub created_at: u64,
    /// Ordered tag list.
    pub tags: Vec<Tag>,
    /// JSON-encoded filter document.
    pub content: String,
    /// Schnorr signature over the id.
    pub sig: String,
}

impl Event {
    /// Bytes whose SHA-256 must equal `id`:
    /// `[0,<pubkey>,<created_at>,<kind>,<tags>,<content>]` as compact JSON.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let arr = serde_json::json!([0, self.pubkey, self.created_at, self.kind, self.tags, self.content]);
        serde_json::to_vec(&arr)
    }

    /// Recompute the event hash from its fields.
    pub fn compute_hash(&self) -> serde_json::Result<[u8; 32]> {
        let data = self.canonical_bytes()?;
        Ok(Sha256::digest(&data).into())
    }

    /// Whether any tag is exactly `[key, value, ..]`.
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags
            .iter()
            .any(|tag| tag.key() == Some(key) && tag.value() == Some(value))
    }

    /// Value of the first tag named `key`.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key() == Some(key))
            .and_then(Tag::value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Event {
        Event {
            id: String::new(),
            pubkey: "ab".repeat(32),
            kind: 30078,
            created_at: 100,
            tags: vec![
                Tag(vec!["d".into(), "adablock-filters".into()]),
                Tag(vec!["version".into(), "1.0.1".into()]),
            ],
            content: "{\"version\":\"1.0.1\"}".into(),
            sig: String::new(),
        }
    }

    #[test]
    fn canonical_bytes_are_compact() {
        let ev = sample();
        let bytes = ev.canonical_bytes().unwrap();
        let expected = format!(
            "[0,\"{}\",100,30078,[[\"d\",\"adablock-filters\"],[\"version\",\"1.0.1\"]],\"{{\\\"version\\\":\\\"1.0.1\\\"}}\"]",
            "ab".repeat(32)
        );
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn canonical_bytes_escape_controls_and_keep_utf8() {
        let mut ev = sample();
        ev.tags.clear();
        ev.content = "line\nbreak \"q\" ü".into();
        let text = String::from_utf8(ev.canonical_bytes().unwrap()).unwrap();
        assert!(text.ends_with("\"line\\nbreak \\\"q\\\" ü\"]"));
    }

    #[test]
    fn hash_changes_with_content() {
        let a = sample();
        let mut b = sample();
        b.content = "{}".into();
        assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
    }

    #[test]
    fn tag_lookup() {
        let ev = sample();
        assert!(ev.has_tag("d", "adablock-filters"));
        assert!(!ev.has_tag("d", "other"));
        assert!(!ev.has_tag("version", "adablock-filters"));
        assert_eq!(ev.tag_value("version"), Some("1.0.1"));
        assert_eq!(ev.tag_value("missing"), None);
    }

    #[test]
    fn deserializes_wire_json() {
        let ev: Event = serde_json::from_value(serde_json::json!({
            "id": "aa", "pubkey": "bb", "kind": 30078, "created_at": 5,
            "tags": [["d", "x"]], "content": "", "sig": "cc"
        }))
        .unwrap();
        assert_eq!(ev.tags, vec![Tag(vec!["d".into(), "x".into()])]);
    }
}
