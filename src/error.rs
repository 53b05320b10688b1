//! Error types shared by the storage boundary and the engine.

use thiserror::Error;
use uuid::Uuid;

use crate::field_path::FieldPathError;
use crate::models::{ContainerKind, EmbeddedField};

/// Failures reported by a [`ContainerStore`](crate::store::ContainerStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container {0} not found")]
    ContainerNotFound(Uuid),
    #[error("field `{0}` cannot be written")]
    ReadOnlyField(String),
    #[error("update rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Failures raised while decoding, locating or mutating embedded records.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("record `{record_id}` not found in {field}")]
    RecordNotFound {
        field: EmbeddedField,
        record_id: String,
    },
    #[error("no record stored in {0}")]
    EmptySlot(EmbeddedField),
    #[error("group `{0}` not found")]
    GroupNotFound(String),
    #[error("effect `{0}` not found")]
    EffectNotFound(String),
    #[error("record `{0}` has no lifecycle effect")]
    MissingLifecycleEffect(String),
    #[error("{kind} containers have no {field} field")]
    UnsupportedField {
        kind: ContainerKind,
        field: EmbeddedField,
    },
    #[error("{field} holds {found}, expected {expected}")]
    FieldShape {
        field: EmbeddedField,
        expected: &'static str,
        found: &'static str,
    },
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Path(#[from] FieldPathError),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    #[error("write failed: {0}")]
    WriteFailure(#[from] StoreError),
}

impl EngineError {
    pub fn record_not_found(field: EmbeddedField, record_id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            field,
            record_id: record_id.into(),
        }
    }

    /// Whether the error means the addressed thing does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RecordNotFound { .. }
                | Self::EmptySlot(_)
                | Self::GroupNotFound(_)
                | Self::EffectNotFound(_)
                | Self::WriteFailure(StoreError::ContainerNotFound(_))
        )
    }
}

/// Name of a JSON value's type, for shape errors.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}
