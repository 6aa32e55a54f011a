//! Branch decoding descriptors.
//!
//! A branch's decoding rule is produced by the file parser and travels
//! through the index array as an opaque [`Descriptor`] blob. The lookup
//! engine only ever needs one property of it: its identity, the
//! `cache_key`. Two descriptors with the same key decode bytes the same way
//! even if their encoded blobs differ.

use serde::{Deserialize, Serialize};

/// How to turn a branch's raw basket bytes into typed values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interpretation {
    /// Structural identity of the decoding rule.
    pub cache_key: String,

    /// Human-readable type name (for example `"int64"` or `"float64[]"`).
    pub typename: String,

    /// Parser-specific details needed by the external decoder.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl Interpretation {
    /// Create an interpretation with no parser-specific detail.
    pub fn new(cache_key: impl Into<String>, typename: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            typename: typename.into(),
            detail: serde_json::Value::Null,
        }
    }

    /// Attach parser-specific detail.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    /// Whether `other` decodes bytes with the same rule.
    pub fn same_rule(&self, other: &Interpretation) -> bool {
        self.cache_key == other.cache_key
    }

    /// Encode into the opaque blob stored in era records.
    pub fn to_descriptor(&self) -> serde_json::Result<Descriptor> {
        serde_json::to_vec(self).map(Descriptor)
    }
}

/// Serialized [`Interpretation`], stored positionally next to branch names.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Descriptor(pub Vec<u8>);

impl Descriptor {
    /// Decode the blob back into an [`Interpretation`].
    pub fn decode(&self) -> serde_json::Result<Interpretation> {
        serde_json::from_slice(&self.0)
    }

    /// Raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_decodes_to_the_same_interpretation() {
        let interp = Interpretation::new("INT64;required", "int64")
            .with_detail(serde_json::json!({"max_def_level": 0}));
        let blob = interp.to_descriptor().unwrap();
        assert_eq!(blob.decode().unwrap(), interp);
    }

    #[test]
    fn same_rule_ignores_detail_and_typename() {
        let a = Interpretation::new("k", "int64");
        let b = Interpretation::new("k", "long").with_detail(serde_json::json!({"x": 1}));
        let c = Interpretation::new("other", "int64");
        assert!(a.same_rule(&b));
        assert!(!a.same_rule(&c));
    }

    #[test]
    fn null_detail_is_omitted_from_the_blob() {
        let blob = Interpretation::new("k", "t").to_descriptor().unwrap();
        let text = std::str::from_utf8(blob.as_bytes()).unwrap();
        assert!(!text.contains("detail"));
    }
}
