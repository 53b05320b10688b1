//! Write-back of transient entity edits into their container.
//!
//! Every edit goes through [`Synchronizer::write_back`]: read the field that
//! holds the record, replace only that record, update the entity locally, then
//! persist the whole field. Failures come back as a [`SyncOutcome`] and are
//! never raised to the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::codec::{LifecycleRepair, RecordCodec};
use super::projection::RecordList;
use super::transient::TransientEntity;
use crate::error::{json_type_name, EngineError};
use crate::field_path;
use crate::models::{EmbeddedField, EmbeddedRecord};
use crate::store::{single_change, ContainerStore};

/// Where a record lives inside its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLocator {
    /// A single-valued field such as `system.embeddedItem`.
    Single(EmbeddedField),
    /// A member of a list field, found by id.
    Member {
        field: EmbeddedField,
        record_id: String,
    },
}

impl RecordLocator {
    pub fn field(&self) -> EmbeddedField {
        match self {
            Self::Single(field) => *field,
            Self::Member { field, .. } => *field,
        }
    }
}

/// Result of a write-back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Written,
    /// The locator matched nothing; the write was abandoned.
    RecordNotFound {
        field: EmbeddedField,
        record_id: String,
    },
    /// The store rejected the write. The entity keeps its local state.
    WriteFailed { notice: String },
    /// The viewer may not edit the record.
    Denied,
    /// The mutation itself failed; nothing was written.
    Rejected { reason: String },
}

impl SyncOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Per-container locks that serialize read-modify-write cycles.
#[derive(Debug, Default)]
pub struct WriteLanes {
    lanes: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl WriteLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the container's lane.
    pub async fn acquire(&self, container_id: Uuid) -> OwnedMutexGuard<()> {
        let lane = {
            let mut lanes = self.lanes.lock().expect("write lanes lock poisoned");
            lanes.retain(|id, lane| *id == container_id || Arc::strong_count(lane) > 1);
            lanes.entry(container_id).or_default().clone()
        };
        lane.lock_owned().await
    }
}

pub struct Synchronizer<S> {
    store: Arc<S>,
    lanes: Option<Arc<WriteLanes>>,
    codec: RecordCodec,
}

impl<S> Clone for Synchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            lanes: self.lanes.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<S: ContainerStore> Synchronizer<S> {
    /// A synchronizer with last-write-wins semantics across editors.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lanes: None,
            codec: RecordCodec::default(),
        }
    }

    /// A synchronizer that runs one read-modify-write per container at a time.
    pub fn serialized(store: Arc<S>) -> Self {
        Self {
            store,
            lanes: Some(Arc::new(WriteLanes::new())),
            codec: RecordCodec::default(),
        }
    }

    /// Use `codec` to restore lifecycle effects that an edit removed.
    pub fn with_codec(mut self, codec: RecordCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Hold the container's write lane, if lanes are enabled.
    pub async fn lock_container(&self, container_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        match &self.lanes {
            Some(lanes) => Some(lanes.acquire(container_id).await),
            None => None,
        }
    }

    /// Apply `mutate` to the entity's record and persist the field holding it.
    pub async fn write_back<F>(&self, entity: &mut TransientEntity, mutate: F) -> SyncOutcome
    where
        F: FnOnce(&mut EmbeddedRecord) -> Result<(), EngineError> + Send,
    {
        let container_id = entity.container_id();
        let locator = entity.locator();
        let field = locator.field();
        let _lane = self.lock_container(container_id).await;

        let current = match self.store.get(container_id, field.path()).await {
            Ok(current) => current,
            Err(err) => {
                error!(container = %container_id, field = %field, error = %err, "Failed to read field for write-back");
                return SyncOutcome::WriteFailed {
                    notice: format!("Could not save {}: {}", entity.source().display_name(), err),
                };
            }
        };

        let staged = match stage(current, &locator, entity.source(), &self.codec, mutate) {
            Ok(staged) => staged,
            Err(EngineError::RecordNotFound { field, record_id }) => {
                warn!(container = %container_id, field = %field, record = %record_id, "Record not found, write abandoned");
                return SyncOutcome::RecordNotFound { field, record_id };
            }
            Err(EngineError::EmptySlot(field)) => {
                warn!(container = %container_id, field = %field, "Embedded slot is empty, write abandoned");
                return SyncOutcome::RecordNotFound {
                    field,
                    record_id: entity.original_id().to_string(),
                };
            }
            Err(err) => {
                warn!(container = %container_id, field = %field, record = %entity.original_id(), error = %err, "Edit rejected");
                return SyncOutcome::Rejected {
                    reason: err.to_string(),
                };
            }
        };

        // Local state first, so a failed or slow write never shows the old value.
        entity.replace_source(staged.record);

        match self
            .store
            .update(container_id, single_change(field.path(), staged.field_value))
            .await
        {
            Ok(()) => {
                debug!(container = %container_id, field = %field, record = %entity.original_id(), "Wrote back embedded record");
                SyncOutcome::Written
            }
            Err(err) => {
                error!(container = %container_id, field = %field, record = %entity.original_id(), error = %err, "Write-back failed");
                SyncOutcome::WriteFailed {
                    notice: format!("Could not save {}: {}", entity.source().display_name(), err),
                }
            }
        }
    }
}

/// A mutated record and the field value that carries it.
#[derive(Debug)]
pub(crate) struct Staged {
    pub record: EmbeddedRecord,
    pub field_value: Value,
}

/// Rebuild the field value with the mutated record in place.
///
/// The editor's local record is the base for the mutation, except for `group`
/// and `sort`, which collection operations own and are read from storage.
/// Siblings come from `current` untouched. `mutate` can not change the id,
/// and status or gear records leave with exactly one lifecycle effect.
pub(crate) fn stage<F>(
    current: Option<Value>,
    locator: &RecordLocator,
    local: &EmbeddedRecord,
    codec: &RecordCodec,
    mutate: F,
) -> Result<Staged, EngineError>
where
    F: FnOnce(&mut EmbeddedRecord) -> Result<(), EngineError>,
{
    match locator {
        RecordLocator::Member { field, record_id } => {
            let mut list = RecordList::from_value(*field, current)?;
            let stored = list
                .get(record_id)
                .cloned()
                .ok_or_else(|| EngineError::record_not_found(*field, record_id.clone()))?;

            let record = mutated(local, &stored, record_id, codec, mutate)?;
            list.put(&record)?;
            Ok(Staged {
                record,
                field_value: list.to_value(),
            })
        }
        RecordLocator::Single(field) => {
            let stored = match current {
                None | Some(Value::Null) => return Err(EngineError::EmptySlot(*field)),
                Some(value @ Value::Object(_)) => value,
                Some(other) => {
                    return Err(EngineError::FieldShape {
                        field: *field,
                        expected: "a record",
                        found: json_type_name(&other),
                    })
                }
            };
            if let Some(stored_id) = stored.get("id").and_then(Value::as_str) {
                if stored_id != local.id {
                    return Err(EngineError::record_not_found(*field, local.id.clone()));
                }
            }

            let record = mutated(local, &stored, &local.id, codec, mutate)?;
            let mut field_value = record.to_value()?;
            field_path::keep_nulls(&stored, &mut field_value);
            Ok(Staged {
                field_value,
                record,
            })
        }
    }
}

fn mutated<F>(
    local: &EmbeddedRecord,
    stored: &Value,
    record_id: &str,
    codec: &RecordCodec,
    mutate: F,
) -> Result<EmbeddedRecord, EngineError>
where
    F: FnOnce(&mut EmbeddedRecord) -> Result<(), EngineError>,
{
    let mut record = local.clone();
    record.group = stored.get("group").and_then(Value::as_str).map(str::to_string);
    record.sort = stored.get("sort").and_then(Value::as_number).cloned();

    mutate(&mut record)?;
    record.id = record_id.to_string();
    if codec.enforce_lifecycle(&mut record) != LifecycleRepair::Untouched {
        debug!(record = %record.id, kind = %record.kind, "Restored lifecycle effect after edit");
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> EmbeddedRecord {
        EmbeddedRecord::from_value(value).unwrap()
    }

    fn codec() -> RecordCodec {
        RecordCodec::default()
    }

    fn member(record_id: &str) -> RecordLocator {
        RecordLocator::Member {
            field: EmbeddedField::Effects,
            record_id: record_id.to_string(),
        }
    }

    #[test]
    fn stage_replaces_only_the_target() {
        let current = json!([
            { "id": "a", "kind": "status", "odd": { "x": [1, 2] } },
            { "id": "b", "kind": "status", "name": "Old" },
            { "id": "c", "kind": "status" }
        ]);
        let local = record(json!({ "id": "b", "kind": "status", "name": "Old" }));

        let staged = stage(Some(current.clone()), &member("b"), &local, &codec(), |r| {
            r.name = Some("New".into());
            Ok(())
        })
        .unwrap();

        assert_eq!(staged.field_value[0], current[0]);
        assert_eq!(staged.field_value[2], current[2]);
        assert_eq!(staged.field_value[1]["name"], json!("New"));
    }

    #[test]
    fn stage_fails_for_unknown_ids() {
        let local = record(json!({ "id": "z", "kind": "status" }));
        let err = stage(Some(json!([{ "id": "a" }])), &member("z"), &local, &codec(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, EngineError::RecordNotFound { record_id, .. } if record_id == "z"));
    }

    #[test]
    fn stage_keeps_the_original_id() {
        let local = record(json!({ "id": "a", "kind": "action" }));
        let staged = stage(Some(json!([{ "id": "a" }])), &member("a"), &local, &codec(), |r| {
            r.id = "hijacked".into();
            Ok(())
        })
        .unwrap();
        assert_eq!(staged.record.id, "a");
        assert_eq!(staged.field_value[0]["id"], json!("a"));
    }

    #[test]
    fn stage_takes_group_and_sort_from_storage() {
        let local = record(json!({ "id": "a", "kind": "action", "group": "old", "sort": 9 }));
        let stored = json!([{ "id": "a", "kind": "action", "group": "new", "sort": 2 }]);

        let staged = stage(Some(stored), &member("a"), &local, &codec(), |_| Ok(())).unwrap();

        assert_eq!(staged.record.group.as_deref(), Some("new"));
        assert_eq!(staged.record.sort, Some(2.into()));
    }

    #[test]
    fn stage_single_slot_requires_a_record() {
        let local = record(json!({ "id": "i1", "kind": "action" }));
        let locator = RecordLocator::Single(EmbeddedField::Item);

        let err = stage(None, &locator, &local, &codec(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, EngineError::EmptySlot(EmbeddedField::Item)));

        let err = stage(Some(json!({ "id": "other" })), &locator, &local, &codec(), |_| Ok(())).unwrap_err();
        assert!(err.is_not_found());

        let staged = stage(Some(json!({ "id": "i1" })), &locator, &local, &codec(), |r| {
            r.name = Some("Axe".into());
            Ok(())
        })
        .unwrap();
        assert_eq!(staged.field_value, json!({ "id": "i1", "kind": "action", "name": "Axe" }));
    }

    #[test]
    fn stage_restores_a_removed_lifecycle_effect() {
        let local = record(json!({ "id": "s", "kind": "status", "effects": [{ "id": "fx" }] }));
        let stored = json!([{ "id": "s", "kind": "status", "effects": [{ "id": "fx" }] }]);

        let staged = stage(Some(stored), &member("s"), &local, &codec(), |r| {
            r.effects = Some(Vec::new());
            Ok(())
        })
        .unwrap();

        assert_eq!(staged.record.effects().len(), 1);
        assert_eq!(staged.field_value[0]["effects"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn stage_injects_an_effect_when_the_kind_becomes_gear() {
        let local = record(json!({ "id": "a", "kind": "action" }));

        let staged = stage(Some(json!([{ "id": "a", "kind": "action" }])), &member("a"), &local, &codec(), |r| {
            r.kind = crate::models::RecordKind::Gear;
            Ok(())
        })
        .unwrap();

        assert_eq!(staged.record.effects().len(), 1);
        assert_eq!(staged.record.effects()[0].duration_seconds(), 0.0);
    }

    #[test]
    fn stage_keeps_explicit_nulls_of_a_single_record() {
        let stored = json!({ "id": "i1", "kind": "action", "name": null, "system": null });
        let local = record(stored.clone());

        let staged = stage(Some(stored.clone()), &RecordLocator::Single(EmbeddedField::Item), &local, &codec(), |_| Ok(()))
            .unwrap();

        assert_eq!(staged.field_value, stored);
    }

    #[test]
    fn mutation_errors_abort_staging() {
        let local = record(json!({ "id": "a", "kind": "action" }));
        let err = stage(Some(json!([{ "id": "a" }])), &member("a"), &local, &codec(), |_| {
            Err(EngineError::EffectNotFound("fx".into()))
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::EffectNotFound(_)));
    }
}
