//! Embedded-record materialization and synchronization.
//!
//! # Components
//!
//! - [`RecordCodec`]: normalizes raw records and injects default lifecycle effects.
//! - [`PermissionDelegate`]: answers permission questions with the parent container.
//! - [`Materializer`]: turns a raw record into a [`TransientEntity`].
//! - [`Synchronizer`]: writes entity edits back into the container field.
//! - [`toggle`]: the on/off switch stored as an effect duration.
//! - [`GroupManager`]: groups of records and their dissolution.
//! - [`RecordCollection`]: create, delete, duplicate and reorder records.
//! - [`EmbeddedEditor`]: one open record and its write path.

mod codec;
mod editor;
mod groups;
mod materialize;
mod permissions;
mod projection;
mod records;
mod sync;
mod transient;

pub mod toggle;

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

pub use codec::{LifecycleRepair, Normalized, RecordCodec, DEFAULT_TINT};
pub use editor::{EditorEvent, EmbeddedEditor};
pub use groups::{GroupManager, GroupSet, GROUPED_FIELD};
pub use materialize::Materializer;
pub use permissions::{PermissionDelegate, Permissions};
pub use projection::RecordList;
pub use records::RecordCollection;
pub use sync::{RecordLocator, SyncOutcome, Synchronizer, WriteLanes};
pub use transient::{EntityView, RuntimeEffect, TransientEntity};

use crate::config::InlayConfig;
use crate::error::EngineError;
use crate::models::{Container, EmbeddedField, Viewer};
use crate::store::ContainerStore;

/// Entry point tying the engine components to one store.
pub struct Engine<S> {
    sync: Synchronizer<S>,
    materializer: Materializer,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
            materializer: self.materializer.clone(),
        }
    }
}

impl<S: ContainerStore> Engine<S> {
    pub fn new(sync: Synchronizer<S>, codec: RecordCodec) -> Self {
        Self {
            sync: sync.with_codec(codec.clone()),
            materializer: Materializer::new(codec),
        }
    }

    pub fn from_config(store: Arc<S>, config: &InlayConfig) -> Self {
        let sync = if config.serialize_container_writes {
            Synchronizer::serialized(store)
        } else {
            Synchronizer::new(store)
        };
        Self::new(sync, RecordCodec::new(config.default_effect_tint.clone()))
    }

    pub fn store(&self) -> &Arc<S> {
        self.sync.store()
    }

    pub fn synchronizer(&self) -> &Synchronizer<S> {
        &self.sync
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    pub fn codec(&self) -> &RecordCodec {
        self.materializer.codec()
    }

    pub fn records(&self, container_id: Uuid) -> RecordCollection<S> {
        RecordCollection::new(self.sync.clone(), self.codec().clone(), container_id)
    }

    pub fn groups(&self, container_id: Uuid) -> GroupManager<S> {
        GroupManager::new(self.sync.clone(), container_id)
    }

    pub fn open_editor(
        &self,
        container: Arc<Container>,
        record: Value,
        field: EmbeddedField,
        viewer: Viewer,
    ) -> Result<EmbeddedEditor<S>, EngineError> {
        EmbeddedEditor::open(
            self.sync.clone(),
            &self.materializer,
            container,
            record,
            field,
            viewer,
        )
    }

    pub async fn open_editor_from_store(
        &self,
        container_id: Uuid,
        field: EmbeddedField,
        record_id: Option<&str>,
        viewer: Viewer,
    ) -> Result<EmbeddedEditor<S>, EngineError> {
        EmbeddedEditor::open_from_store(
            self.sync.clone(),
            &self.materializer,
            container_id,
            field,
            record_id,
            viewer,
        )
        .await
    }
}
