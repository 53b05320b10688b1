use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A set of attribute changes carried by an embedded record, plus the
/// lifecycle duration that doubles as its on/off switch.
///
/// Only the fields the engine reasons about are typed. Anything else the
/// persisted descriptor carries is kept in `extra` and written back untouched,
/// so an unmodified descriptor serializes to the value it was read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<EffectChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<EffectDuration>,
    /// Display tint as a `#rrggbb` string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EffectDescriptor {
    pub fn changes(&self) -> &[EffectChange] {
        self.changes.as_deref().unwrap_or_default()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_ref().map_or(0.0, EffectDuration::seconds)
    }
}

/// One attribute modification: apply `value` to `key` using `mode`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectChange {
    pub key: String,
    pub mode: i64,
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Duration block of an effect descriptor.
///
/// `seconds` is the only field read by the engine and may be any JSON number;
/// the round/turn bookkeeping stays opaque in `rest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EffectDuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<Number>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl EffectDuration {
    pub fn seconds(&self) -> f64 {
        self.seconds.as_ref().and_then(Number::as_f64).unwrap_or(0.0)
    }
}
