use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use super::effect::EffectDescriptor;

/// Length of generated record, effect and group identifiers.
pub const ID_LENGTH: usize = 16;

/// Generate a fresh identifier for an embedded record, effect or group.
pub fn generate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LENGTH);
    id
}

/// A sub-entity stored inline inside a container field.
///
/// Embedded records have no storage of their own: they live in the
/// container's `system` data and are only ever persisted by rewriting the
/// field that holds them. Unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedRecord {
    pub id: String,
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Kind-specific fields, kept verbatim.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub system: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Vec<EffectDescriptor>>,
    /// Id of the group this record belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Position within the list. Kept as stored, fractional or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmbeddedRecord {
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn effects(&self) -> &[EffectDescriptor] {
        self.effects.as_deref().unwrap_or_default()
    }

    pub fn effects_mut(&mut self) -> &mut Vec<EffectDescriptor> {
        self.effects.get_or_insert_with(Vec::new)
    }

    pub fn effect(&self, effect_id: &str) -> Option<&EffectDescriptor> {
        self.effects().iter().find(|e| e.id == effect_id)
    }

    /// The descriptor whose duration encodes the record's on/off state.
    ///
    /// Always the first descriptor; status and gear records carry exactly one.
    pub fn lifecycle_effect(&self) -> Option<&EffectDescriptor> {
        self.effects().first()
    }

    pub fn lifecycle_effect_mut(&mut self) -> Option<&mut EffectDescriptor> {
        self.effects.as_mut().and_then(|effects| effects.first_mut())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }
}

/// What an embedded record represents.
///
/// Unrecognized kinds are carried as `Other` so they survive a write-back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordKind {
    /// Status-like records (conditions, buffs).
    Status,
    /// Gear-like records (equipment with passive effects).
    Gear,
    Action,
    CombatPower,
    ActionCard,
    Other(String),
}

impl RecordKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::Gear => "gear",
            Self::Action => "action",
            Self::CombatPower => "combatPower",
            Self::ActionCard => "actionCard",
            Self::Other(kind) => kind,
        }
    }

    /// Status and gear records must carry exactly one lifecycle effect.
    pub fn requires_lifecycle_effect(&self) -> bool {
        matches!(self, Self::Status | Self::Gear)
    }
}

impl From<String> for RecordKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "status" => Self::Status,
            "gear" => Self::Gear,
            "action" => Self::Action,
            "combatPower" => Self::CombatPower,
            "actionCard" => Self::ActionCard,
            _ => Self::Other(kind),
        }
    }
}

impl From<RecordKind> for String {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
