use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How much of a container a user may see or change.
///
/// Levels are ordered, so `level >= OwnershipLevel::Observer` reads as
/// "at least observer".
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipLevel {
    #[default]
    None,
    Limited,
    Observer,
    Owner,
}

impl OwnershipLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Limited => "limited",
            Self::Observer => "observer",
            Self::Owner => "owner",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "limited" => Some(Self::Limited),
            "observer" => Some(Self::Observer),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

/// Per-user ownership record of a container.
///
/// Users without an explicit entry fall back to `default`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ownership {
    #[serde(default)]
    pub default: OwnershipLevel,
    #[serde(default)]
    pub users: BTreeMap<String, OwnershipLevel>,
}

impl Ownership {
    /// Ownership where a single user owns the container and everyone else sees nothing.
    pub fn owned_by(user_id: impl Into<String>) -> Self {
        let mut users = BTreeMap::new();
        users.insert(user_id.into(), OwnershipLevel::Owner);
        Self {
            default: OwnershipLevel::None,
            users,
        }
    }

    pub fn level_for(&self, user_id: &str) -> OwnershipLevel {
        self.users.get(user_id).copied().unwrap_or(self.default)
    }
}

/// The role a user plays at the table.
///
/// Gamemasters implicitly own every container.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Player,
    Trusted,
    Assistant,
    Gamemaster,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Trusted => "trusted",
            Self::Assistant => "assistant",
            Self::Gamemaster => "gamemaster",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "player" => Some(Self::Player),
            "trusted" => Some(Self::Trusted),
            "assistant" => Some(Self::Assistant),
            "gamemaster" => Some(Self::Gamemaster),
            _ => None,
        }
    }
}

/// The user on whose behalf permission questions are asked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
    #[serde(default)]
    pub role: UserRole,
}

impl Viewer {
    pub fn player(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Player,
        }
    }

    pub fn gamemaster(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Gamemaster,
        }
    }

    pub fn is_gamemaster(&self) -> bool {
        self.role == UserRole::Gamemaster
    }
}
