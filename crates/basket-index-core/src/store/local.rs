//! Store backed by JSON files in a local directory.
//!
//! Each array lives in `<root>/<name>.json`. Writes are atomic, so a reader
//! opening an array concurrently with a publish sees either the old or the
//! new version. A read parses the whole file once and then serves slices from
//! memory.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use snafu::prelude::*;

use crate::storage::{self, DataLocation, StorageError};
use crate::store::error::{InvalidNameSnafu, JsonSnafu, StorageSnafu, StoreError};
use crate::store::{MetadataStore, ValueHandle};

/// One JSON file per array under a root directory.
#[derive(Clone, Debug)]
pub struct LocalStore {
    location: DataLocation,
}

impl LocalStore {
    /// Store rooted at `location`.
    pub fn new(location: DataLocation) -> Self {
        Self { location }
    }

    fn rel_path(name: &str) -> Result<PathBuf, StoreError> {
        ensure!(
            !name.is_empty()
                && !name.starts_with('.')
                && !name.contains(['/', '\\'])
                && !name.contains(".."),
            InvalidNameSnafu { name }
        );
        Ok(PathBuf::from(format!("{name}.json")))
    }
}

#[async_trait]
impl MetadataStore for LocalStore {
    type Handle = ValueHandle;

    async fn write(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        let rel = Self::rel_path(name)?;
        let bytes = serde_json::to_vec(value).context(JsonSnafu { name })?;
        storage::write_atomic(&self.location, &rel, &bytes)
            .await
            .context(StorageSnafu { name })
    }

    async fn read(&self, name: &str) -> Result<ValueHandle, StoreError> {
        let rel = Self::rel_path(name)?;
        let bytes = match storage::read_all_bytes(&self.location, &rel).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => {
                return Err(StoreError::ArrayNotFound {
                    name: name.to_string(),
                });
            }
            Err(source) => {
                return Err(StoreError::Storage {
                    name: name.to_string(),
                    source,
                });
            }
        };
        let value: Value = serde_json::from_slice(&bytes).context(JsonSnafu { name })?;
        Ok(ValueHandle::new(value))
    }
}
