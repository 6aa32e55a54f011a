//! Insertion-ordered deduplication with dense ids.

use std::collections::HashMap;

/// Append-only table assigning dense ids in first-seen order.
///
/// Used for both eras (keyed by the schema fingerprint) and prefixes
/// (keyed by the prefix string). Ids are positions in [`entries`](Self::entries).
#[derive(Clone, Debug)]
pub struct DenseRegistry<V> {
    entries: Vec<V>,
    by_key: HashMap<String, usize>,
}

impl<V> Default for DenseRegistry<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            by_key: HashMap::new(),
        }
    }
}

impl<V> DenseRegistry<V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `key`, registering `make()` under a new id if the
    /// key is unseen.
    pub fn get_or_insert_with(&mut self, key: &str, make: impl FnOnce() -> V) -> usize {
        if let Some(&id) = self.by_key.get(key) {
            return id;
        }
        let id = self.entries.len();
        self.entries.push(make());
        self.by_key.insert(key.to_string(), id);
        id
    }

    /// Registered values in id order.
    pub fn entries(&self) -> &[V] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_first_seen() {
        let mut reg = DenseRegistry::new();
        assert_eq!(reg.get_or_insert_with("b", || "B"), 0);
        assert_eq!(reg.get_or_insert_with("a", || "A"), 1);
        assert_eq!(reg.get_or_insert_with("b", || "ignored"), 0);
        assert_eq!(reg.entries(), &["B", "A"]);
    }

    #[test]
    fn existing_key_does_not_call_the_constructor() {
        let mut reg = DenseRegistry::new();
        reg.get_or_insert_with("k", || 1);
        reg.get_or_insert_with("k", || panic!("must not rebuild an existing entry"));
        assert_eq!(reg.entries(), &[1]);
    }
}
