//! Container-level operations on embedded record fields.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::codec::RecordCodec;
use super::groups::group_set;
use super::projection::RecordList;
use super::sync::Synchronizer;
use crate::error::EngineError;
use crate::models::{generate_id, Container, EmbeddedField, EmbeddedRecord, ACTION_CARD_GROUPS_PATH};
use crate::store::{single_change, ContainerStore, FieldChanges};

pub struct RecordCollection<S> {
    sync: Synchronizer<S>,
    codec: RecordCodec,
    container_id: Uuid,
}

impl<S: ContainerStore> RecordCollection<S> {
    pub fn new(sync: Synchronizer<S>, codec: RecordCodec, container_id: Uuid) -> Self {
        Self {
            sync,
            codec,
            container_id,
        }
    }

    pub fn container_id(&self) -> Uuid {
        self.container_id
    }

    async fn load(&self, field: EmbeddedField) -> Result<Container, EngineError> {
        let container = self.sync.store().load(self.container_id).await?;
        if !container.supports(field) {
            return Err(EngineError::UnsupportedField {
                kind: container.kind,
                field,
            });
        }
        Ok(container)
    }

    async fn load_list(&self, field: EmbeddedField) -> Result<(Container, RecordList), EngineError> {
        if !field.is_list() {
            return Err(EngineError::Invalid(format!("{field} is not a list")));
        }
        let container = self.load(field).await?;
        let list = RecordList::from_value(field, container.field(field))?;
        Ok((container, list))
    }

    /// The records of a list field, in stored order.
    pub async fn list(&self, field: EmbeddedField) -> Result<RecordList, EngineError> {
        let (_, list) = self.load_list(field).await?;
        Ok(list)
    }

    /// Normalize `draft` and append it to the list.
    pub async fn create_record(
        &self,
        field: EmbeddedField,
        mut draft: Value,
    ) -> Result<EmbeddedRecord, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let (container, mut list) = self.load_list(field).await?;

        if let Some(map) = draft.as_object_mut() {
            let taken = map
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| list.contains(id));
            if taken {
                map.remove("id");
            }
        }

        let mut record = self
            .codec
            .normalize(&mut draft, &container, field.is_effect_list())?
            .record;
        record.sort = Some((list.max_sort() + 1).into());

        let mut changes = FieldChanges::new();
        if let Some(group_id) = record.group.as_deref().filter(|_| field.supports_groups()) {
            let mut groups = group_set(&container)?;
            if !groups.contains(group_id) {
                return Err(EngineError::GroupNotFound(group_id.to_string()));
            }
            groups.joined(group_id);
            changes.insert(ACTION_CARD_GROUPS_PATH.to_string(), groups.to_value()?);
        }

        list.push(&record)?;
        changes.insert(field.path().to_string(), list.to_value());
        self.sync.store().update(self.container_id, changes).await?;

        info!(container = %self.container_id, field = %field, record = %record.id, kind = %record.kind, "Created embedded record");
        Ok(record)
    }

    /// Remove a record. Returns the ids of groups dissolved as a result.
    pub async fn delete_record(
        &self,
        field: EmbeddedField,
        record_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        self.delete_records(field, &[record_id.to_string()]).await
    }

    /// Remove several records in one write.
    ///
    /// Groups they belonged to are checked for dissolution, then every other
    /// empty group is swept. Returns the ids of removed groups.
    pub async fn delete_records(
        &self,
        field: EmbeddedField,
        record_ids: &[String],
    ) -> Result<Vec<String>, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let (container, mut list) = self.load_list(field).await?;

        if let Some(missing) = record_ids.iter().find(|id| !list.contains(id)) {
            return Err(EngineError::record_not_found(field, missing.clone()));
        }

        let mut left = BTreeSet::new();
        for id in record_ids {
            if let Some(group) = list.group_of(id) {
                left.insert(group.to_string());
            }
            list.remove(id);
        }

        let mut changes = single_change(field.path(), list.to_value());
        let mut dissolved = Vec::new();
        if field.supports_groups() {
            let mut groups = group_set(&container)?;
            for group in left {
                if groups.check_dissolution(&group, &list) {
                    dissolved.push(group);
                }
            }
            dissolved.extend(groups.cleanup_empty(&list));
            if !dissolved.is_empty() {
                changes.insert(ACTION_CARD_GROUPS_PATH.to_string(), groups.to_value()?);
            }
        }

        self.sync.store().update(self.container_id, changes).await?;
        info!(container = %self.container_id, field = %field, records = ?record_ids, dissolved = ?dissolved, "Deleted embedded records");
        Ok(dissolved)
    }

    /// Copy a record directly after itself, with fresh ids and a " (Copy)" name.
    pub async fn duplicate_record(
        &self,
        field: EmbeddedField,
        record_id: &str,
    ) -> Result<EmbeddedRecord, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let (_, mut list) = self.load_list(field).await?;

        let source = list.decode(record_id)?;
        let mut copy = fresh_copy(&source);
        copy.name = Some(format!("{} (Copy)", source.display_name()));

        list.insert_after(record_id, &copy)?;
        self.sync
            .store()
            .update(self.container_id, single_change(field.path(), list.to_value()))
            .await?;

        info!(container = %self.container_id, field = %field, source = %record_id, record = %copy.id, "Duplicated embedded record");
        Ok(copy)
    }

    /// Rewrite `sort` so records follow `ordered_ids`; unlisted records go last.
    pub async fn reorder_records(
        &self,
        field: EmbeddedField,
        ordered_ids: &[String],
    ) -> Result<(), EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let (_, mut list) = self.load_list(field).await?;

        list.reorder(ordered_ids)?;
        self.sync
            .store()
            .update(self.container_id, single_change(field.path(), list.to_value()))
            .await?;

        debug!(container = %self.container_id, field = %field, "Reordered embedded records");
        Ok(())
    }

    /// The record in the single-valued item field, if any.
    pub async fn embedded_item(&self) -> Result<Option<Value>, EngineError> {
        let container = self.load(EmbeddedField::Item).await?;
        Ok(container.field(EmbeddedField::Item))
    }

    /// Replace whatever the item field holds with `draft`.
    pub async fn set_embedded_item(&self, mut draft: Value) -> Result<EmbeddedRecord, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let container = self.load(EmbeddedField::Item).await?;

        let record = self.codec.normalize(&mut draft, &container, false)?.record;
        self.sync
            .store()
            .update(
                self.container_id,
                single_change(EmbeddedField::Item.path(), record.to_value()?),
            )
            .await?;

        info!(container = %self.container_id, record = %record.id, kind = %record.kind, "Set embedded item");
        Ok(record)
    }

    /// Empty the item field. Returns whether it held a record.
    pub async fn clear_embedded_item(&self) -> Result<bool, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let container = self.load(EmbeddedField::Item).await?;

        let had_item = container.field(EmbeddedField::Item).is_some();
        if had_item {
            self.sync
                .store()
                .update(
                    self.container_id,
                    single_change(EmbeddedField::Item.path(), Value::Null),
                )
                .await?;
            info!(container = %self.container_id, "Cleared embedded item");
        }
        Ok(had_item)
    }
}

/// Clone a record under a fresh id, giving its effects fresh ids too.
pub(crate) fn fresh_copy(record: &EmbeddedRecord) -> EmbeddedRecord {
    let mut copy = record.clone();
    copy.id = generate_id();
    if let Some(effects) = copy.effects.as_mut() {
        for effect in effects {
            effect.id = generate_id();
        }
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_copy_renews_every_id() {
        let record = EmbeddedRecord::from_value(json!({
            "id": "r1",
            "kind": "action",
            "name": "Strike",
            "group": "g1",
            "effects": [{ "id": "a" }, { "id": "b" }]
        }))
        .unwrap();

        let copy = fresh_copy(&record);

        assert_ne!(copy.id, record.id);
        assert_eq!(copy.group, record.group);
        assert_eq!(copy.name, record.name);
        assert!(copy.effects().iter().all(|e| e.id != "a" && e.id != "b"));
        assert_eq!(copy.effects().len(), 2);
    }

    #[test]
    fn fresh_copy_does_not_invent_effects() {
        let record = EmbeddedRecord::from_value(json!({ "id": "r1", "kind": "combatPower" })).unwrap();
        assert!(fresh_copy(&record).effects.is_none());
    }
}
