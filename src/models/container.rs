use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::permission::Ownership;
use crate::field_path;

/// Field path of the group list used by action-card collections.
pub const ACTION_CARD_GROUPS_PATH: &str = "system.actionCardGroups";

/// A persisted top-level entity that owns embedded records.
///
/// Embedded records live inside `system`, one field per [`EmbeddedField`].
/// The container is the only thing the storage layer knows about; every edit
/// of an embedded record ends up as an update of one of these fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Container {
    pub id: Uuid,
    pub name: String,
    pub kind: ContainerKind,
    #[serde(default)]
    pub ownership: Ownership,
    /// Locked containers can be viewed by owners but not edited.
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub system: Value,
    /// Incremented by the store on every successful field update.
    #[serde(default)]
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Container {
    /// Read a value by dotted field path, e.g. `system.embeddedEffects`.
    ///
    /// Top-level keys resolve against the container's serialized form, so
    /// `name` and `locked` are addressable too.
    pub fn get(&self, path: &str) -> Option<Value> {
        match path.split_once('.') {
            Some(("system", rest)) => field_path::get(&self.system, rest).cloned(),
            _ if path == "system" => Some(self.system.clone()),
            _ => serde_json::to_value(self)
                .ok()
                .and_then(|doc| field_path::get(&doc, path).cloned()),
        }
    }

    pub fn field(&self, field: EmbeddedField) -> Option<Value> {
        self.get(field.path()).filter(|v| !v.is_null())
    }

    pub fn supports(&self, field: EmbeddedField) -> bool {
        self.kind.supported_fields().contains(&field)
    }
}

/// The kinds of containers that embed records.
///
/// - `ActionCard`: a card embedding one action item plus status-like effects
/// - `Transformation`: embeds combat powers and a grouped list of action cards
/// - `Actor`: a character holding grouped action cards and effects
/// - `Item`: a plain item with embedded effects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    ActionCard,
    Transformation,
    Actor,
    Item,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActionCard => "action_card",
            Self::Transformation => "transformation",
            Self::Actor => "actor",
            Self::Item => "item",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "action_card" => Some(Self::ActionCard),
            "transformation" => Some(Self::Transformation),
            "actor" => Some(Self::Actor),
            "item" => Some(Self::Item),
            _ => None,
        }
    }

    pub fn supported_fields(&self) -> &'static [EmbeddedField] {
        match self {
            Self::ActionCard => &[EmbeddedField::Item, EmbeddedField::Effects],
            Self::Transformation => &[EmbeddedField::CombatPowers, EmbeddedField::ActionCards],
            Self::Actor => &[EmbeddedField::ActionCards, EmbeddedField::Effects],
            Self::Item => &[EmbeddedField::Effects],
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container field that holds embedded records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddedField {
    /// `system.embeddedItem`: a single record or null.
    Item,
    /// `system.embeddedEffects`: the effects list.
    Effects,
    /// `system.embeddedCombatPowers`
    CombatPowers,
    /// `system.embeddedActionCards`: supports grouping.
    ActionCards,
}

impl EmbeddedField {
    pub const ALL: [EmbeddedField; 4] = [
        Self::Item,
        Self::Effects,
        Self::CombatPowers,
        Self::ActionCards,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Self::Item => "system.embeddedItem",
            Self::Effects => "system.embeddedEffects",
            Self::CombatPowers => "system.embeddedCombatPowers",
            Self::ActionCards => "system.embeddedActionCards",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.path() == path)
    }

    /// Short name used in URLs, matching the serialized form.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Effects => "effects",
            Self::CombatPowers => "combat-powers",
            Self::ActionCards => "action-cards",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.slug() == slug)
    }

    pub fn is_list(&self) -> bool {
        !matches!(self, Self::Item)
    }

    /// Members of the effects list materialize with `is_effect` set.
    pub fn is_effect_list(&self) -> bool {
        matches!(self, Self::Effects)
    }

    pub fn supports_groups(&self) -> bool {
        matches!(self, Self::ActionCards)
    }
}

impl fmt::Display for EmbeddedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Input for creating a new container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContainerInput {
    pub name: String,
    pub kind: ContainerKind,
    #[serde(default)]
    pub ownership: Ownership,
    #[serde(default)]
    pub locked: bool,
    /// Initial `system` data. Defaults to an empty object.
    #[serde(default)]
    pub system: Option<Value>,
}

/// Input for updating a container's own attributes. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateContainerInput {
    pub name: Option<String>,
    pub locked: Option<bool>,
    pub ownership: Option<Ownership>,
}
