//! Runtime materialization of a single embedded record.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::permissions::{PermissionDelegate, Permissions};
use super::sync::RecordLocator;
use super::toggle;
use crate::error::EngineError;
use crate::field_path;
use crate::models::{
    Container, EffectDescriptor, EmbeddedField, EmbeddedRecord, Ownership, OwnershipLevel,
    RecordKind, Viewer,
};

/// An effect descriptor as the editor sees it, parented to its record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeEffect {
    #[serde(flatten)]
    pub descriptor: EffectDescriptor,
    pub parent_id: String,
    pub active: bool,
}

impl RuntimeEffect {
    fn new(descriptor: EffectDescriptor, parent_id: &str) -> Self {
        Self {
            active: toggle::is_active(&descriptor),
            descriptor,
            parent_id: parent_id.to_string(),
        }
    }
}

/// An editable, never-persisted stand-in for one embedded record.
///
/// It lives exactly as long as the editor that owns it. Changes reach
/// storage only through the [`Synchronizer`](super::Synchronizer).
#[derive(Debug, Clone)]
pub struct TransientEntity {
    source: EmbeddedRecord,
    effects: IndexMap<String, RuntimeEffect>,
    permissions: PermissionDelegate,
    original_id: String,
    is_effect: bool,
    field: EmbeddedField,
}

impl TransientEntity {
    pub(crate) fn new(source: EmbeddedRecord, parent: Arc<Container>, field: EmbeddedField) -> Self {
        let effects = runtime_effects(&source);
        Self {
            original_id: source.id.clone(),
            is_effect: field.is_effect_list(),
            permissions: PermissionDelegate::new(parent),
            effects,
            source,
            field,
        }
    }

    pub fn id(&self) -> &str {
        &self.source.id
    }

    /// The id the record had when it was materialized. Write-backs locate the
    /// stored record by this id.
    pub fn original_id(&self) -> &str {
        &self.original_id
    }

    pub fn is_effect(&self) -> bool {
        self.is_effect
    }

    pub fn kind(&self) -> &RecordKind {
        &self.source.kind
    }

    pub fn field(&self) -> EmbeddedField {
        self.field
    }

    pub fn container(&self) -> &Arc<Container> {
        self.permissions.parent()
    }

    pub fn container_id(&self) -> Uuid {
        self.container().id
    }

    pub fn source(&self) -> &EmbeddedRecord {
        &self.source
    }

    pub fn system(&self) -> &Value {
        &self.source.system
    }

    pub fn effects(&self) -> &IndexMap<String, RuntimeEffect> {
        &self.effects
    }

    pub fn lifecycle_effect(&self) -> Option<&RuntimeEffect> {
        self.effects.first().map(|(_, effect)| effect)
    }

    /// Toggle state read from the lifecycle effect, if the record has one.
    pub fn is_active(&self) -> Option<bool> {
        self.lifecycle_effect().map(|effect| effect.active)
    }

    pub fn locator(&self) -> RecordLocator {
        if self.field.is_list() {
            RecordLocator::Member {
                field: self.field,
                record_id: self.original_id.clone(),
            }
        } else {
            RecordLocator::Single(self.field)
        }
    }

    /// Deep-merge `partial` into the local record without touching storage.
    pub fn update_source(&mut self, partial: Value) -> Result<(), EngineError> {
        let mut value = self.source.to_value()?;
        field_path::merge(&mut value, partial);
        let mut record = EmbeddedRecord::from_value(value)
            .map_err(|e| EngineError::MalformedRecord(e.to_string()))?;
        record.id = self.original_id.clone();
        self.replace_source(record);
        Ok(())
    }

    pub(crate) fn replace_source(&mut self, record: EmbeddedRecord) {
        self.effects = runtime_effects(&record);
        self.source = record;
    }

    /// Point the entity at a newer copy of its container.
    pub(crate) fn refresh_container(&mut self, container: Arc<Container>) {
        self.permissions = PermissionDelegate::new(container);
    }

    pub fn view(&self, viewer: &Viewer) -> EntityView {
        EntityView {
            record: self.source.clone(),
            effects: self.effects.values().cloned().collect(),
            container_id: self.container_id(),
            field: self.field,
            is_effect: self.is_effect,
            is_owner: self.is_owner(viewer),
            is_editable: self.is_editable(viewer),
            active: self.is_active(),
        }
    }
}

impl Permissions for TransientEntity {
    fn ownership(&self) -> &Ownership {
        self.permissions.ownership()
    }

    fn is_locked(&self) -> bool {
        self.permissions.is_locked()
    }

    fn permission_level(&self, viewer: &Viewer) -> OwnershipLevel {
        self.permissions.permission_level(viewer)
    }

    fn is_owner(&self, viewer: &Viewer) -> bool {
        self.permissions.is_owner(viewer)
    }

    fn is_editable(&self, viewer: &Viewer) -> bool {
        self.permissions.is_editable(viewer)
    }

    fn test_user_permission(&self, viewer: &Viewer, level: OwnershipLevel, exact: bool) -> bool {
        self.permissions.test_user_permission(viewer, level, exact)
    }
}

/// Everything an editor needs to render one record.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    pub record: EmbeddedRecord,
    pub effects: Vec<RuntimeEffect>,
    pub container_id: Uuid,
    pub field: EmbeddedField,
    pub is_effect: bool,
    pub is_owner: bool,
    pub is_editable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

fn runtime_effects(record: &EmbeddedRecord) -> IndexMap<String, RuntimeEffect> {
    record
        .effects()
        .iter()
        .map(|descriptor| {
            (
                descriptor.id.clone(),
                RuntimeEffect::new(descriptor.clone(), &record.id),
            )
        })
        .collect()
}
