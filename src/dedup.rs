// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Content-hash deduplication
//
// A candidate snapshot is hashed over its canonical serialization
// (serde_json with sorted object keys). The gate remembers only the hash
// of the last emitted candidate.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_128;

// ---------------------------------------------------------------------------
// Hash value
// ---------------------------------------------------------------------------

/// Fixed-size fingerprint of a candidate's canonical serialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

// ---------------------------------------------------------------------------
// Hasher seam
// ---------------------------------------------------------------------------

/// Hashes canonical candidate bytes. Not used for any security decision.
pub trait ContentHasher: Send + Sync {
    fn hash(&self, canonical: &[u8]) -> ContentHash;
}

/// Default hasher: 128-bit XXH3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3ContentHasher;

impl ContentHasher for Xxh3ContentHasher {
    fn hash(&self, canonical: &[u8]) -> ContentHash {
        ContentHash(xxh3_128(canonical).to_be_bytes())
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// What an outward update would expose, borrowed from the frame under
/// construction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Candidate<'a> {
    pub content: &'a str,
    pub value: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolCandidate<'a>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolCandidate<'a> {
    pub name: &'a str,
    pub ordinal: usize,
    pub arguments: Option<&'a str>,
}

impl<'a> Candidate<'a> {
    /// No content, no tool, and a value that is absent, null or `{}`.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.has_empty_value()
    }

    /// No tool, and a value that is absent, null or `{}`, whatever the text.
    pub fn has_empty_value(&self) -> bool {
        let empty_value = match self.value {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        };
        empty_value && self.tool.is_none()
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        // Value maps are BTreeMaps, so key order is already stable.
        serde_json::to_vec(self).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "candidate serialization failed, hashing empty bytes");
            Vec::new()
        })
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Decides whether a candidate differs from the last emitted one.
pub struct DeduplicationGate {
    hasher: Arc<dyn ContentHasher>,
    last_emitted: Option<ContentHash>,
}

impl DeduplicationGate {
    pub fn new(hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            hasher,
            last_emitted: None,
        }
    }

    pub fn should_emit(&self, candidate: &Candidate<'_>) -> bool {
        if self.is_blank(candidate) {
            return false;
        }
        let hash = self.hash(candidate);
        self.last_emitted != Some(hash)
    }

    pub fn record(&mut self, candidate: &Candidate<'_>) {
        self.last_emitted = Some(self.hash(candidate));
    }

    /// `should_emit` followed by `record` on success, hashing once.
    pub fn admit(&mut self, candidate: &Candidate<'_>) -> bool {
        if self.is_blank(candidate) {
            return false;
        }
        let hash = self.hash(candidate);
        if self.last_emitted == Some(hash) {
            tracing::debug!(hash = %hash, "duplicate candidate suppressed");
            return false;
        }
        self.last_emitted = Some(hash);
        true
    }

    pub fn last_emitted(&self) -> Option<ContentHash> {
        self.last_emitted
    }

    /// Empty candidates never emit. Until the first emission, neither does
    /// one whose value is still empty, so no session opens on `{}`.
    fn is_blank(&self, candidate: &Candidate<'_>) -> bool {
        candidate.is_empty() || (self.last_emitted.is_none() && candidate.has_empty_value())
    }

    fn hash(&self, candidate: &Candidate<'_>) -> ContentHash {
        self.hasher.hash(&candidate.canonical_bytes())
    }
}

impl fmt::Debug for DeduplicationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeduplicationGate")
            .field("last_emitted", &self.last_emitted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gate() -> DeduplicationGate {
        DeduplicationGate::new(Arc::new(Xxh3ContentHasher))
    }

    fn text(content: &str) -> Candidate<'_> {
        Candidate {
            content,
            value: None,
            tool: None,
        }
    }

    fn valued<'a>(content: &'a str, value: &'a Value) -> Candidate<'a> {
        Candidate {
            content,
            value: Some(value),
            tool: None,
        }
    }

    #[test]
    fn first_candidate_with_a_value_emits() {
        let value = json!({"a": 1});
        let mut gate = gate();
        assert!(gate.should_emit(&valued("{\"a\":1", &value)));
        assert!(gate.admit(&valued("{\"a\":1", &value)));
        assert!(gate.last_emitted().is_some());
    }

    #[test]
    fn identical_candidate_is_suppressed() {
        let value = json!([1]);
        let mut gate = gate();
        assert!(gate.admit(&valued("[1", &value)));
        assert!(!gate.admit(&valued("[1", &value)));
        assert!(gate.admit(&valued("[1 ", &value)));
    }

    #[test]
    fn first_update_is_never_an_empty_object() {
        let empty_object = json!({});
        let mut gate = gate();
        assert!(!gate.should_emit(&valued("{", &empty_object)));
        assert!(!gate.admit(&valued("{", &empty_object)));
        assert!(!gate.admit(&text("{\"na")));
        assert_eq!(gate.last_emitted(), None);

        // Once something real went out, text-only progress counts.
        let value = json!({"name": "Al"});
        assert!(gate.admit(&valued("{\"name\":\"Al", &value)));
        assert!(gate.admit(&text("{\"name\":\"Al\",")));
    }

    #[test]
    fn empty_candidates_never_emit() {
        let mut gate = gate();
        let empty_object = json!({});
        for candidate in [
            text(""),
            Candidate {
                content: "",
                value: Some(&Value::Null),
                tool: None,
            },
            Candidate {
                content: "",
                value: Some(&empty_object),
                tool: None,
            },
        ] {
            assert!(!gate.should_emit(&candidate));
            assert!(!gate.admit(&candidate));
        }
        assert_eq!(gate.last_emitted(), None);
    }

    #[test]
    fn key_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        let mut gate = gate();
        assert!(gate.admit(&Candidate {
            content: "",
            value: Some(&a),
            tool: None,
        }));
        assert!(!gate.should_emit(&Candidate {
            content: "",
            value: Some(&b),
            tool: None,
        }));
    }

    #[test]
    fn tool_candidate_differs_from_text_candidate() {
        let value = json!("x");
        let mut gate = gate();
        assert!(gate.admit(&valued("\"x\"", &value)));
        assert!(gate.admit(&Candidate {
            content: "\"x\"",
            value: None,
            tool: Some(ToolCandidate {
                name: "search",
                ordinal: 0,
                arguments: None,
            }),
        }));
    }

    #[test]
    fn record_replaces_last_hash() {
        let mut gate = gate();
        gate.record(&text("a"));
        assert!(!gate.should_emit(&text("a")));
        gate.record(&text("b"));
        assert!(gate.should_emit(&text("a")));
    }

    struct CountingHasher(AtomicUsize);

    impl ContentHasher for CountingHasher {
        fn hash(&self, canonical: &[u8]) -> ContentHash {
            self.0.fetch_add(1, Ordering::SeqCst);
            Xxh3ContentHasher.hash(canonical)
        }
    }

    #[test]
    fn admit_hashes_once_and_uses_injected_hasher() {
        let hasher = Arc::new(CountingHasher(AtomicUsize::new(0)));
        let mut gate = DeduplicationGate::new(hasher.clone());
        let value = json!(1);
        gate.admit(&valued("1", &value));
        gate.admit(&valued("1", &value));
        assert_eq!(hasher.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_hasher_is_128_bit_xxh3() {
        let hash = Xxh3ContentHasher.hash(b"{\"a\":1}");
        assert_eq!(hash, Xxh3ContentHasher.hash(b"{\"a\":1}"));
        assert_ne!(hash, Xxh3ContentHasher.hash(b"{\"a\":2}"));
        assert_eq!(hash.as_bytes(), &xxh3_128(b"{\"a\":1}").to_be_bytes());
        assert_eq!(hash.to_string().len(), 32);
    }

    #[test]
    fn hash_displays_as_hex() {
        let hash = ContentHash::from_bytes([0xab; 16]);
        assert_eq!(hash.to_string(), "ab".repeat(16));
    }
}
