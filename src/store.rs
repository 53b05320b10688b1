//! The persistence boundary of the engine.
//!
//! Everything the engine persists goes through [`ContainerStore::update`],
//! which replaces whole fields of a container. Embedded records are never
//! written individually.

use std::collections::BTreeMap;
use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Container;

/// New values keyed by dotted field path, applied atomically.
pub type FieldChanges = BTreeMap<String, Value>;

pub trait ContainerStore: Send + Sync + 'static {
    /// Load the container, failing with [`StoreError::ContainerNotFound`] if it is gone.
    fn load(&self, id: Uuid) -> impl Future<Output = Result<Container, StoreError>> + Send;

    /// Read the current value at `field_path`, or `None` if the path is unset.
    fn get(
        &self,
        id: Uuid,
        field_path: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Replace every field in `changes`. Either all changes land or none do.
    fn update(
        &self,
        id: Uuid,
        changes: FieldChanges,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Build a change set touching a single field.
pub fn single_change(field_path: &str, value: Value) -> FieldChanges {
    let mut changes = FieldChanges::new();
    changes.insert(field_path.to_string(), value);
    changes
}
