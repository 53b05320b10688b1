//! Editing session for one embedded record.
//!
//! An [`EmbeddedEditor`] owns the [`TransientEntity`] for as long as the
//! record is open. Every user action funnels into one write path, and the
//! outcome is reported as a [`SyncOutcome`] plus queued [`EditorEvent`]s for
//! the UI layer.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::codec::ensure_id;
use super::materialize::Materializer;
use super::permissions::Permissions;
use super::projection::RecordList;
use super::sync::{SyncOutcome, Synchronizer};
use super::toggle;
use super::transient::{EntityView, TransientEntity};
use crate::error::EngineError;
use crate::field_path;
use crate::models::{Container, EffectDescriptor, EmbeddedField, EmbeddedRecord, Viewer};
use crate::store::{single_change, ContainerStore};

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "message", rename_all = "snake_case")]
pub enum EditorEvent {
    /// A write landed; repaint from the entity.
    Render,
    /// A user-visible failure.
    Notice(String),
}

pub struct EmbeddedEditor<S> {
    entity: TransientEntity,
    sync: Synchronizer<S>,
    viewer: Viewer,
    events: Vec<EditorEvent>,
}

impl<S: ContainerStore> EmbeddedEditor<S> {
    /// Materialize `record` out of `container` and open it for `viewer`.
    pub fn open(
        sync: Synchronizer<S>,
        materializer: &Materializer,
        container: Arc<Container>,
        mut record: Value,
        field: EmbeddedField,
        viewer: Viewer,
    ) -> Result<Self, EngineError> {
        let entity = materializer.materialize(&mut record, container, field)?;
        debug!(
            container = %entity.container_id(),
            record = %entity.id(),
            user = %viewer.user_id,
            "Opened embedded editor"
        );
        Ok(Self {
            entity,
            sync,
            viewer,
            events: Vec::new(),
        })
    }

    /// Load the container and open one of its records.
    ///
    /// List fields need a `record_id`; the item field ignores it. Ids the
    /// store was missing are repaired and persisted before the record opens.
    pub async fn open_from_store(
        sync: Synchronizer<S>,
        materializer: &Materializer,
        container_id: Uuid,
        field: EmbeddedField,
        record_id: Option<&str>,
        viewer: Viewer,
    ) -> Result<Self, EngineError> {
        let container = sync.store().load(container_id).await?;
        if !container.supports(field) {
            return Err(EngineError::UnsupportedField {
                kind: container.kind,
                field,
            });
        }

        let record = if field.is_list() {
            let record_id = record_id.ok_or_else(|| {
                EngineError::Invalid(format!("a record id is needed to open a member of {field}"))
            })?;
            let list = RecordList::from_value(field, container.field(field))?;
            if !list.repaired().is_empty() {
                sync.store()
                    .update(container_id, single_change(field.path(), list.to_value()))
                    .await?;
            }
            list.get(record_id)
                .cloned()
                .ok_or_else(|| EngineError::record_not_found(field, record_id))?
        } else {
            let mut item = container
                .field(field)
                .ok_or(EngineError::EmptySlot(field))?;
            if let Some(map) = item.as_object_mut() {
                if ensure_id(map) {
                    warn!(container = %container_id, field = %field, "Embedded item had no id, assigned a fresh one");
                    sync.store()
                        .update(container_id, single_change(field.path(), item.clone()))
                        .await?;
                }
            }
            item
        };

        Self::open(sync, materializer, Arc::new(container), record, field, viewer)
    }

    pub fn entity(&self) -> &TransientEntity {
        &self.entity
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn view(&self) -> EntityView {
        self.entity.view(&self.viewer)
    }

    /// Drain the events queued since the last call.
    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Reload the parent container, picking up ownership or lock changes.
    pub async fn refresh(&mut self) -> Result<(), EngineError> {
        let container = self.sync.store().load(self.entity.container_id()).await?;
        self.entity.refresh_container(Arc::new(container));
        Ok(())
    }

    /// Merge submitted form data into the record. Keys are dotted paths.
    pub async fn on_submit(&mut self, form_data: Map<String, Value>) -> SyncOutcome {
        let partial = match field_path::expand(&form_data) {
            Ok(partial) => partial,
            Err(err) => return self.reject(err.into()),
        };
        self.commit("submit", move |record| merge_into(record, partial))
            .await
    }

    /// Store rich-editor content (description, icon, tint) at `field_path`.
    pub async fn on_save(&mut self, field_path: &str, content: Value) -> SyncOutcome {
        let path = field_path.to_string();
        self.commit("save", move |record| {
            let mut value = record.to_value()?;
            field_path::set(&mut value, &path, content)?;
            *record = decode(value)?;
            Ok(())
        })
        .await
    }

    /// Switch the record's lifecycle effect on or off.
    pub async fn on_toggle(&mut self, checked: bool) -> SyncOutcome {
        self.commit("toggle", move |record| toggle::apply(record, checked))
            .await
    }

    /// Add a nested effect. Status and gear records keep their single effect.
    pub async fn create_effect(&mut self, mut draft: Value) -> SyncOutcome {
        if self.entity.kind().requires_lifecycle_effect() {
            return self.reject(EngineError::Invalid(format!(
                "{} records carry exactly one effect",
                self.entity.kind()
            )));
        }
        let Some(map) = draft.as_object_mut() else {
            return self.reject(EngineError::Invalid("effect must be an object".to_string()));
        };
        ensure_id(map);
        map.entry("duration")
            .or_insert_with(|| serde_json::to_value(toggle::encode(false)).unwrap_or(Value::Null));

        let effect: EffectDescriptor = match serde_json::from_value(draft) {
            Ok(effect) => effect,
            Err(err) => return self.reject(err.into()),
        };
        self.commit("create effect", move |record| {
            record.effects_mut().push(effect);
            Ok(())
        })
        .await
    }

    /// Merge form data into one nested effect.
    pub async fn update_effect(&mut self, effect_id: &str, form_data: Map<String, Value>) -> SyncOutcome {
        let partial = match field_path::expand(&form_data) {
            Ok(partial) => partial,
            Err(err) => return self.reject(err.into()),
        };
        let effect_id = effect_id.to_string();
        self.commit("update effect", move |record| {
            let effect = record
                .effects
                .as_mut()
                .and_then(|effects| effects.iter_mut().find(|e| e.id == effect_id))
                .ok_or_else(|| EngineError::EffectNotFound(effect_id.clone()))?;
            let mut value = serde_json::to_value(&*effect)?;
            field_path::merge(&mut value, partial);
            let mut updated: EffectDescriptor = serde_json::from_value(value)
                .map_err(|e| EngineError::MalformedRecord(e.to_string()))?;
            updated.id = effect_id;
            *effect = updated;
            Ok(())
        })
        .await
    }

    /// Remove a nested effect. The lifecycle effect of status and gear records stays.
    pub async fn delete_effect(&mut self, effect_id: &str) -> SyncOutcome {
        let is_lifecycle = self
            .entity
            .lifecycle_effect()
            .is_some_and(|e| e.descriptor.id == effect_id);
        if is_lifecycle && self.entity.kind().requires_lifecycle_effect() {
            return self.reject(EngineError::Invalid(format!(
                "the lifecycle effect of a {} record can not be deleted",
                self.entity.kind()
            )));
        }

        let effect_id = effect_id.to_string();
        self.commit("delete effect", move |record| {
            let effects = record.effects_mut();
            let index = effects
                .iter()
                .position(|e| e.id == effect_id)
                .ok_or(EngineError::EffectNotFound(effect_id))?;
            effects.remove(index);
            Ok(())
        })
        .await
    }

    /// Close the editor. Writes already issued are not cancelled.
    pub fn close(self) {
        debug!(
            container = %self.entity.container_id(),
            record = %self.entity.id(),
            "Closed embedded editor"
        );
    }

    async fn commit<F>(&mut self, action: &'static str, mutate: F) -> SyncOutcome
    where
        F: FnOnce(&mut EmbeddedRecord) -> Result<(), EngineError> + Send,
    {
        // Permissions follow the container as stored now, not as it was at open.
        if let Err(err) = self.refresh().await {
            warn!(
                container = %self.entity.container_id(),
                record = %self.entity.id(),
                action,
                error = %err,
                "Could not reload container before edit"
            );
            let notice = format!("Could not save {}: {}", self.entity.source().display_name(), err);
            self.events.push(EditorEvent::Notice(notice.clone()));
            return SyncOutcome::WriteFailed { notice };
        }

        if !self.entity.is_editable(&self.viewer) {
            warn!(
                container = %self.entity.container_id(),
                record = %self.entity.id(),
                user = %self.viewer.user_id,
                action,
                "Edit denied"
            );
            self.events.push(EditorEvent::Notice(format!(
                "You do not have permission to edit {}",
                self.entity.source().display_name()
            )));
            return SyncOutcome::Denied;
        }

        let outcome = self.sync.write_back(&mut self.entity, mutate).await;
        match &outcome {
            SyncOutcome::Written => self.events.push(EditorEvent::Render),
            SyncOutcome::WriteFailed { notice } => {
                self.events.push(EditorEvent::Notice(notice.clone()))
            }
            SyncOutcome::Rejected { reason } => {
                self.events.push(EditorEvent::Notice(reason.clone()))
            }
            SyncOutcome::RecordNotFound { .. } | SyncOutcome::Denied => {}
        }
        outcome
    }

    fn reject(&mut self, err: EngineError) -> SyncOutcome {
        warn!(record = %self.entity.id(), error = %err, "Edit rejected");
        let reason = err.to_string();
        self.events.push(EditorEvent::Notice(reason.clone()));
        SyncOutcome::Rejected { reason }
    }
}

fn merge_into(record: &mut EmbeddedRecord, partial: Value) -> Result<(), EngineError> {
    let mut value = record.to_value()?;
    field_path::merge(&mut value, partial);
    *record = decode(value)?;
    Ok(())
}

fn decode(value: Value) -> Result<EmbeddedRecord, EngineError> {
    EmbeddedRecord::from_value(value).map_err(|e| EngineError::MalformedRecord(e.to_string()))
}
