//! In-process store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::store::error::StoreError;
use crate::store::{MetadataStore, ValueHandle};

/// Arrays kept in a shared map; handles share the stored value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    arrays: RwLock<HashMap<String, Arc<Value>>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all stored arrays, sorted.
    pub fn names(&self) -> Vec<String> {
        let arrays = self.arrays.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = arrays.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    type Handle = ValueHandle;

    async fn write(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        let mut arrays = self.arrays.write().unwrap_or_else(PoisonError::into_inner);
        arrays.insert(name.to_string(), Arc::new(value.clone()));
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<ValueHandle, StoreError> {
        let arrays = self.arrays.read().unwrap_or_else(PoisonError::into_inner);
        arrays
            .get(name)
            .cloned()
            .map(ValueHandle::new)
            .ok_or_else(|| StoreError::ArrayNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArrayHandle;
    use serde_json::json;

    #[tokio::test]
    async fn handles_keep_the_value_they_were_opened_with() {
        let store = MemoryStore::new();
        store.write("a", &json!([1])).await.unwrap();
        let first = store.read("a").await.unwrap();

        store.write("a", &json!([2])).await.unwrap();
        let second = store.read("a").await.unwrap();

        assert_eq!(first.slice(&[]).await.unwrap(), json!([1]));
        assert_eq!(second.slice(&[]).await.unwrap(), json!([2]));
        assert_eq!(store.names(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn unknown_names_are_reported() {
        let store = MemoryStore::new();
        let err = store.read("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::ArrayNotFound { ref name } if name == "missing"));
    }
}
