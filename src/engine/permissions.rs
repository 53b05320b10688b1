//! Permission capability shared by containers and transient entities.

use std::sync::Arc;

use crate::models::{Container, Ownership, OwnershipLevel, Viewer};

/// Answers "what may this viewer do with me?".
pub trait Permissions {
    fn ownership(&self) -> &Ownership;

    fn is_locked(&self) -> bool {
        false
    }

    fn permission_level(&self, viewer: &Viewer) -> OwnershipLevel {
        if viewer.is_gamemaster() {
            return OwnershipLevel::Owner;
        }
        self.ownership().level_for(&viewer.user_id)
    }

    fn is_owner(&self, viewer: &Viewer) -> bool {
        self.permission_level(viewer) >= OwnershipLevel::Owner
    }

    fn is_editable(&self, viewer: &Viewer) -> bool {
        self.is_owner(viewer) && !self.is_locked()
    }

    /// Whether the viewer holds `level`, or exactly `level` when `exact` is set.
    fn test_user_permission(&self, viewer: &Viewer, level: OwnershipLevel, exact: bool) -> bool {
        let held = self.permission_level(viewer);
        if exact {
            held == level
        } else {
            held >= level
        }
    }
}

impl Permissions for Container {
    fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    fn is_locked(&self) -> bool {
        self.locked
    }
}

/// Answers every permission question by asking the parent container.
///
/// A transient entity has no ownership record of its own; evaluated on its
/// own it would never be editable.
#[derive(Debug, Clone)]
pub struct PermissionDelegate {
    parent: Arc<Container>,
}

impl PermissionDelegate {
    pub fn new(parent: Arc<Container>) -> Self {
        Self { parent }
    }

    pub fn parent(&self) -> &Arc<Container> {
        &self.parent
    }
}

impl Permissions for PermissionDelegate {
    fn ownership(&self) -> &Ownership {
        self.parent.ownership()
    }

    fn is_locked(&self) -> bool {
        self.parent.is_locked()
    }

    fn permission_level(&self, viewer: &Viewer) -> OwnershipLevel {
        self.parent.permission_level(viewer)
    }

    fn is_owner(&self, viewer: &Viewer) -> bool {
        self.parent.is_owner(viewer)
    }

    fn is_editable(&self, viewer: &Viewer) -> bool {
        self.parent.is_editable(viewer)
    }

    fn test_user_permission(&self, viewer: &Viewer, level: OwnershipLevel, exact: bool) -> bool {
        self.parent.test_user_permission(viewer, level, exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerKind, UserRole};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn container(ownership: Ownership, locked: bool) -> Container {
        Container {
            id: Uuid::new_v4(),
            name: "Card".to_string(),
            kind: ContainerKind::ActionCard,
            ownership,
            locked,
            system: json!({}),
            revision: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn gamemasters_own_everything() {
        let parent = container(Ownership::default(), false);
        assert!(parent.is_owner(&Viewer::gamemaster("gm")));
        assert!(!parent.is_owner(&Viewer::player("alice")));
    }

    #[test]
    fn locked_containers_are_owned_but_not_editable() {
        let parent = container(Ownership::owned_by("alice"), true);
        let alice = Viewer::player("alice");
        assert!(parent.is_owner(&alice));
        assert!(!parent.is_editable(&alice));
    }

    #[test]
    fn exact_permission_tests_compare_levels() {
        let mut ownership = Ownership::default();
        ownership.default = OwnershipLevel::Observer;
        let parent = container(ownership, false);
        let bob = Viewer {
            user_id: "bob".into(),
            role: UserRole::Trusted,
        };

        assert!(parent.test_user_permission(&bob, OwnershipLevel::Limited, false));
        assert!(!parent.test_user_permission(&bob, OwnershipLevel::Limited, true));
        assert!(parent.test_user_permission(&bob, OwnershipLevel::Observer, true));
        assert!(!parent.test_user_permission(&bob, OwnershipLevel::Owner, false));
    }

    #[test]
    fn delegate_matches_parent_for_every_state() {
        let viewers = [
            Viewer::player("alice"),
            Viewer::player("bob"),
            Viewer::gamemaster("gm"),
        ];
        for locked in [false, true] {
            for default in [
                OwnershipLevel::None,
                OwnershipLevel::Limited,
                OwnershipLevel::Observer,
                OwnershipLevel::Owner,
            ] {
                let mut ownership = Ownership::owned_by("alice");
                ownership.default = default;
                let parent = Arc::new(container(ownership, locked));
                let delegate = PermissionDelegate::new(parent.clone());

                for viewer in &viewers {
                    assert_eq!(delegate.is_owner(viewer), parent.is_owner(viewer));
                    assert_eq!(delegate.is_editable(viewer), parent.is_editable(viewer));
                    assert_eq!(
                        delegate.permission_level(viewer),
                        parent.permission_level(viewer)
                    );
                }
            }
        }
    }
}
