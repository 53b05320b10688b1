use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::codec::RecordCodec;
use super::transient::TransientEntity;
use crate::error::EngineError;
use crate::models::{Container, EmbeddedField};

/// Builds transient entities from raw records held by a container.
#[derive(Debug, Clone, Default)]
pub struct Materializer {
    codec: RecordCodec,
}

impl Materializer {
    pub fn new(codec: RecordCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Normalize `record` in place and wrap it in a [`TransientEntity`].
    ///
    /// Members of the effects list materialize as effect records. Whatever the
    /// codec repairs or injects is also written into `record`, so persisting
    /// the raw value afterwards keeps those defaults.
    pub fn materialize(
        &self,
        record: &mut Value,
        container: Arc<Container>,
        field: EmbeddedField,
    ) -> Result<TransientEntity, EngineError> {
        if !container.supports(field) {
            return Err(EngineError::UnsupportedField {
                kind: container.kind,
                field,
            });
        }

        let normalized = self
            .codec
            .normalize(record, &container, field.is_effect_list())?;

        debug!(
            container = %container.id,
            field = %field,
            record = %normalized.record.id,
            kind = %normalized.record.kind,
            effects = normalized.record.effects().len(),
            repaired = normalized.changed(),
            "Materialized embedded record"
        );

        Ok(TransientEntity::new(normalized.record, container, field))
    }
}
