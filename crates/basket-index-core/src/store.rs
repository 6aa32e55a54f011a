//! Metadata store adapter.
//!
//! Index arrays are persisted under a name and read back lazily: opening a
//! named array yields an [`ArrayHandle`] whose [`slice`](ArrayHandle::slice)
//! materializes only the requested part. Two backends are provided:
//!
//! - [`MemoryStore`] keeps arrays in process memory.
//! - [`LocalStore`] keeps one `<name>.json` file per array under a
//!   [`DataLocation`](crate::storage::DataLocation).

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::Value;
use snafu::prelude::*;

use crate::metadata::IndexArray;

pub mod error;
pub mod local;
pub mod memory;
pub mod slice;

pub use error::StoreError;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use slice::{PathItem, slice};

/// Read access to one stored array.
#[async_trait]
pub trait ArrayHandle: Send + Sync {
    /// Materialize the part of the array selected by `path`.
    async fn slice(&self, path: &[PathItem]) -> Result<Value, StoreError>;
}

#[async_trait]
impl<H: ArrayHandle + ?Sized> ArrayHandle for Arc<H> {
    async fn slice(&self, path: &[PathItem]) -> Result<Value, StoreError> {
        (**self).slice(path).await
    }
}

/// A named collection of stored arrays.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Handle type returned by [`read`](MetadataStore::read).
    type Handle: ArrayHandle;

    /// Store `value` under `name`, replacing any previous array.
    async fn write(&self, name: &str, value: &Value) -> Result<(), StoreError>;

    /// Open the array stored under `name`.
    async fn read(&self, name: &str) -> Result<Self::Handle, StoreError>;
}

/// Handle over an array that is already fully in memory.
#[derive(Clone, Debug)]
pub struct ValueHandle {
    value: Arc<Value>,
}

impl ValueHandle {
    /// Wrap an in-memory array.
    pub fn new(value: impl Into<Arc<Value>>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[async_trait]
impl ArrayHandle for ValueHandle {
    async fn slice(&self, path: &[PathItem]) -> Result<Value, StoreError> {
        slice::slice(&self.value, path)
    }
}

/// Validate `array` and write it to `store` under `name` in stored form.
pub async fn publish<S>(store: &S, name: &str, array: &IndexArray) -> Result<(), StoreError>
where
    S: MetadataStore + ?Sized,
{
    array.validate().context(error::ShapeSnafu { name })?;
    let stored = array.to_stored().context(error::ShapeSnafu { name })?;
    store.write(name, &stored).await?;
    info!(
        "Published index array {name}: {} files, {} entries, {} eras, {} prefixes",
        array.num_files(),
        array.num_entries(),
        array.era.len(),
        array.prefix.len()
    );
    Ok(())
}
