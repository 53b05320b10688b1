//! Conversion between persisted record JSON and [`EmbeddedRecord`].
//!
//! Normalization repairs what the UI may leave out when it creates records
//! (ids, kinds) and guarantees the exactly-one lifecycle effect of status and
//! gear records. Repairs are written into the raw value too, so the next
//! write-back persists them instead of silently dropping them.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::toggle;
use crate::error::{json_type_name, EngineError};
use crate::models::{generate_id, Container, EffectDescriptor, EmbeddedRecord, RecordKind};

pub const DEFAULT_TINT: &str = "#ffffff";

/// A decoded record plus what normalization had to change.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: EmbeddedRecord,
    /// The record had no usable id and was given a fresh one.
    pub repaired_id: bool,
    /// A lifecycle effect was synthesized because none was present.
    pub injected_effect: bool,
}

impl Normalized {
    pub fn changed(&self) -> bool {
        self.repaired_id || self.injected_effect
    }
}

/// What [`RecordCodec::enforce_lifecycle`] had to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRepair {
    Untouched,
    Injected,
    /// This many surplus effects were dropped.
    Trimmed(usize),
}

#[derive(Debug, Clone)]
pub struct RecordCodec {
    default_tint: String,
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new(DEFAULT_TINT)
    }
}

impl RecordCodec {
    pub fn new(default_tint: impl Into<String>) -> Self {
        Self {
            default_tint: default_tint.into(),
        }
    }

    pub fn default_tint(&self) -> &str {
        &self.default_tint
    }

    /// Normalize `raw` in place and decode it.
    pub fn normalize(
        &self,
        raw: &mut Value,
        container: &Container,
        is_effect: bool,
    ) -> Result<Normalized, EngineError> {
        let Value::Object(map) = raw else {
            return Err(EngineError::MalformedRecord(format!(
                "expected an object, found {}",
                json_type_name(raw)
            )));
        };

        let repaired_id = ensure_id(map);
        if repaired_id {
            let record_id = map.get("id").and_then(Value::as_str).unwrap_or_default();
            warn!(
                container = %container.id,
                record = record_id,
                "Embedded record had no id, assigned a fresh one"
            );
        }

        if !map.contains_key("kind") {
            let kind = if is_effect {
                RecordKind::Status
            } else {
                RecordKind::Action
            };
            debug!(container = %container.id, kind = %kind, "Defaulting missing record kind");
            map.insert("kind".to_string(), Value::String(kind.to_string()));
        }

        if let Some(Value::Array(effects)) = map.get_mut("effects") {
            for effect in effects.iter_mut() {
                if let Value::Object(effect) = effect {
                    ensure_id(effect);
                }
            }
        }

        let mut record = EmbeddedRecord::from_value(Value::Object(map.clone()))
            .map_err(|e| EngineError::MalformedRecord(e.to_string()))?;

        let repair = self.enforce_lifecycle(&mut record);
        match repair {
            LifecycleRepair::Injected => {
                let value = serde_json::to_value(&record.effects()[0])?;
                match map.get_mut("effects") {
                    Some(Value::Array(items)) => items.push(value),
                    _ => {
                        map.insert("effects".to_string(), Value::Array(vec![value]));
                    }
                }
                debug!(
                    container = %container.id,
                    record = %record.id,
                    "Injected default lifecycle effect"
                );
            }
            LifecycleRepair::Trimmed(dropped) => {
                warn!(
                    container = %container.id,
                    record = %record.id,
                    dropped,
                    "Dropping surplus effects from {} record",
                    record.kind
                );
                if let Some(Value::Array(items)) = map.get_mut("effects") {
                    items.truncate(1);
                }
            }
            LifecycleRepair::Untouched => {}
        }
        let injected_effect = repair == LifecycleRepair::Injected;

        Ok(Normalized {
            record,
            repaired_id,
            injected_effect,
        })
    }

    /// Give a status or gear record exactly one lifecycle effect.
    ///
    /// A missing effect is synthesized; surplus effects after the first are
    /// dropped. Other kinds are left alone.
    pub fn enforce_lifecycle(&self, record: &mut EmbeddedRecord) -> LifecycleRepair {
        if !record.kind.requires_lifecycle_effect() {
            return LifecycleRepair::Untouched;
        }
        match record.effects().len() {
            0 => {
                let effect = self.lifecycle_effect_for(record);
                record.effects_mut().push(effect);
                LifecycleRepair::Injected
            }
            1 => LifecycleRepair::Untouched,
            count => {
                record.effects_mut().truncate(1);
                LifecycleRepair::Trimmed(count - 1)
            }
        }
    }

    /// Encode a runtime record back into its persisted form.
    pub fn encode(&self, record: &EmbeddedRecord) -> Result<Value, EngineError> {
        Ok(record.to_value()?)
    }

    /// The descriptor synthesized for a status or gear record that has none.
    pub fn lifecycle_effect_for(&self, record: &EmbeddedRecord) -> EffectDescriptor {
        EffectDescriptor {
            id: generate_id(),
            name: Some(record.display_name().to_string()),
            icon: record.icon.clone(),
            changes: Some(Vec::new()),
            duration: Some(toggle::encode(false)),
            tint: Some(self.default_tint.clone()),
            transfer: Some(true),
            disabled: Some(false),
            extra: Map::new(),
        }
    }
}

/// Give the object a fresh `id` unless it already has a non-empty string id.
///
/// Returns whether an id was assigned.
pub(crate) fn ensure_id(map: &mut Map<String, Value>) -> bool {
    let has_id = map
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        map.insert("id".to_string(), Value::String(generate_id()));
    }
    !has_id
}
