//! Record grouping for container fields that support it.
//!
//! Groups live in the container's group list; membership is read from each
//! record's `group` key. Every operation here loads the container, works on
//! the in-memory [`GroupSet`] and [`RecordList`], and persists both fields in
//! a single store update.

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::projection::RecordList;
use super::records::fresh_copy;
use super::sync::Synchronizer;
use crate::error::{json_type_name, EngineError};
use crate::models::{
    generate_id, Container, CreateGroupInput, EmbeddedField, Group, GroupWithMembers,
    UpdateGroupInput, ACTION_CARD_GROUPS_PATH,
};
use crate::store::{ContainerStore, FieldChanges};

/// The field whose records can be grouped.
pub const GROUPED_FIELD: EmbeddedField = EmbeddedField::ActionCards;

/// In-memory copy of a container's group list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSet {
    groups: Vec<Group>,
}

impl GroupSet {
    pub fn from_value(value: Option<Value>) -> Result<Self, EngineError> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value @ Value::Array(_)) => Ok(Self {
                groups: serde_json::from_value(value)?,
            }),
            Some(other) => Err(EngineError::Invalid(format!(
                "{} holds {}, expected a list",
                ACTION_CARD_GROUPS_PATH,
                json_type_name(&other)
            ))),
        }
    }

    pub fn to_value(&self) -> Result<Value, EngineError> {
        Ok(serde_json::to_value(&self.groups)?)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    pub fn get_mut(&mut self, group_id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == group_id)
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.get(group_id).is_some()
    }

    /// Append a new group after the existing ones.
    pub fn create(&mut self, name: impl Into<String>, placeholder: bool) -> Group {
        let group = Group {
            id: generate_id(),
            name: name.into(),
            sort: self
                .groups
                .iter()
                .map(Group::position)
                .reduce(f64::max)
                .map_or(0, |s| s.floor() as i64 + 1)
                .into(),
            collapsed: false,
            placeholder,
        };
        self.groups.push(group.clone());
        group
    }

    pub fn remove(&mut self, group_id: &str) -> Option<Group> {
        let index = self.groups.iter().position(|g| g.id == group_id)?;
        Some(self.groups.remove(index))
    }

    /// Mark the group as joined. A placeholder stops being one.
    pub fn joined(&mut self, group_id: &str) {
        if let Some(group) = self.get_mut(group_id) {
            group.placeholder = false;
        }
    }

    /// Remove `group_id` if no record references it any more.
    ///
    /// Placeholder groups are kept. Returns whether the group was removed.
    pub fn check_dissolution(&mut self, group_id: &str, records: &RecordList) -> bool {
        let dissolve = self
            .get(group_id)
            .is_some_and(|g| !g.placeholder && records.members_of(group_id).is_empty());
        if dissolve {
            self.remove(group_id);
        }
        dissolve
    }

    /// Remove every non-placeholder group without members. Returns the removed ids.
    pub fn cleanup_empty(&mut self, records: &RecordList) -> Vec<String> {
        let mut removed = Vec::new();
        self.groups.retain(|g| {
            let keep = g.placeholder || !records.members_of(&g.id).is_empty();
            if !keep {
                removed.push(g.id.clone());
            }
            keep
        });
        removed
    }

    pub fn with_members(&self, records: &RecordList) -> Vec<GroupWithMembers> {
        let mut groups: Vec<_> = self
            .groups
            .iter()
            .map(|group| GroupWithMembers {
                member_ids: records.members_of(&group.id),
                group: group.clone(),
            })
            .collect();
        groups.sort_by(|a, b| a.group.position().total_cmp(&b.group.position()));
        groups
    }
}

/// Container-level grouping operations, persisted through the store.
pub struct GroupManager<S> {
    sync: Synchronizer<S>,
    container_id: Uuid,
}

/// Loaded state a grouping operation works on.
struct Grouping {
    records: RecordList,
    groups: GroupSet,
}

impl<S: ContainerStore> GroupManager<S> {
    pub fn new(sync: Synchronizer<S>, container_id: Uuid) -> Self {
        Self { sync, container_id }
    }

    pub fn container_id(&self) -> Uuid {
        self.container_id
    }

    async fn load(&self) -> Result<Grouping, EngineError> {
        let container = self.sync.store().load(self.container_id).await?;
        grouping(&container)
    }

    async fn persist(&self, state: &Grouping, records_changed: bool) -> Result<(), EngineError> {
        let mut changes = FieldChanges::new();
        if records_changed {
            changes.insert(GROUPED_FIELD.path().to_string(), state.records.to_value());
        }
        changes.insert(ACTION_CARD_GROUPS_PATH.to_string(), state.groups.to_value()?);
        self.sync.store().update(self.container_id, changes).await?;
        Ok(())
    }

    /// Groups in display order, each with its current members.
    pub async fn groups(&self) -> Result<Vec<GroupWithMembers>, EngineError> {
        let state = self.load().await?;
        Ok(state.groups.with_members(&state.records))
    }

    /// Create a group and move `member_ids` into it.
    ///
    /// A group created without members is a placeholder and survives being
    /// empty until its first record joins.
    pub async fn create_group(&self, input: CreateGroupInput) -> Result<GroupWithMembers, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let mut state = self.load().await?;

        if let Some(missing) = input.member_ids.iter().find(|id| !state.records.contains(id)) {
            return Err(EngineError::record_not_found(GROUPED_FIELD, missing.clone()));
        }

        let group = state.groups.create(input.name, input.member_ids.is_empty());
        let mut left = Vec::new();
        for id in &input.member_ids {
            if let Some(previous) = state.records.set_group(id, Some(&group.id)) {
                left.push(previous);
            }
        }
        for previous in left {
            state.groups.check_dissolution(&previous, &state.records);
        }

        self.persist(&state, !input.member_ids.is_empty()).await?;
        info!(container = %self.container_id, group = %group.id, members = input.member_ids.len(), "Created group");

        Ok(GroupWithMembers {
            member_ids: state.records.members_of(&group.id),
            group,
        })
    }

    /// Move a record into `group_id`, or out of any group with `None`.
    ///
    /// The group the record left is dissolved if that left it empty. Returns
    /// the ids of dissolved groups.
    pub async fn assign_to_group(
        &self,
        record_id: &str,
        group_id: Option<&str>,
    ) -> Result<Vec<String>, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let mut state = self.load().await?;

        if !state.records.contains(record_id) {
            return Err(EngineError::record_not_found(GROUPED_FIELD, record_id));
        }
        if let Some(group_id) = group_id {
            if !state.groups.contains(group_id) {
                return Err(EngineError::GroupNotFound(group_id.to_string()));
            }
            state.groups.joined(group_id);
        }

        let previous = state.records.set_group(record_id, group_id);
        let mut dissolved = Vec::new();
        if let Some(previous) = previous.filter(|p| Some(p.as_str()) != group_id) {
            if state.groups.check_dissolution(&previous, &state.records) {
                dissolved.push(previous);
            }
        }

        self.persist(&state, true).await?;
        debug!(container = %self.container_id, record = %record_id, group = ?group_id, dissolved = ?dissolved, "Assigned record to group");
        Ok(dissolved)
    }

    /// Remove the group if it has no members left. Returns whether it was removed.
    pub async fn check_dissolution(&self, group_id: &str) -> Result<bool, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let mut state = self.load().await?;

        let removed = state.groups.check_dissolution(group_id, &state.records);
        if removed {
            self.persist(&state, false).await?;
            info!(container = %self.container_id, group = %group_id, "Dissolved empty group");
        }
        Ok(removed)
    }

    /// Remove every empty non-placeholder group. Returns the removed ids.
    pub async fn cleanup_empty_groups(&self) -> Result<Vec<String>, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let mut state = self.load().await?;

        let removed = state.groups.cleanup_empty(&state.records);
        if !removed.is_empty() {
            self.persist(&state, false).await?;
            info!(container = %self.container_id, removed = ?removed, "Cleaned up empty groups");
        }
        Ok(removed)
    }

    pub async fn update_group(
        &self,
        group_id: &str,
        input: UpdateGroupInput,
    ) -> Result<Group, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let mut state = self.load().await?;

        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| EngineError::GroupNotFound(group_id.to_string()))?;
        if let Some(name) = input.name {
            group.name = name;
        }
        if let Some(collapsed) = input.collapsed {
            group.collapsed = collapsed;
        }
        if let Some(sort) = input.sort {
            group.sort = sort;
        }
        let group = group.clone();

        self.persist(&state, false).await?;
        Ok(group)
    }

    /// Delete the group. Its members stay in the list, ungrouped.
    pub async fn delete_group(&self, group_id: &str) -> Result<Vec<String>, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let mut state = self.load().await?;

        if state.groups.remove(group_id).is_none() {
            return Err(EngineError::GroupNotFound(group_id.to_string()));
        }
        let members = state.records.members_of(group_id);
        for id in &members {
            state.records.set_group(id, None);
        }

        self.persist(&state, !members.is_empty()).await?;
        info!(container = %self.container_id, group = %group_id, ungrouped = members.len(), "Deleted group");
        Ok(members)
    }

    /// Copy the group and every member record.
    ///
    /// Copies get fresh record and effect ids and join the new group, which is
    /// named after the original with a " (Copy)" suffix. Records and groups are
    /// written in one update, so a failure leaves neither behind.
    pub async fn duplicate_group(&self, group_id: &str) -> Result<GroupWithMembers, EngineError> {
        let _lane = self.sync.lock_container(self.container_id).await;
        let mut state = self.load().await?;

        let source = state
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| EngineError::GroupNotFound(group_id.to_string()))?;
        let members = state.records.members_of(group_id);

        let group = state
            .groups
            .create(format!("{} (Copy)", source.name), members.is_empty());

        let mut sort = state.records.max_sort();
        for id in &members {
            let mut copy = fresh_copy(&state.records.decode(id)?);
            sort += 1;
            copy.group = Some(group.id.clone());
            copy.sort = Some(sort.into());
            state.records.push(&copy)?;
        }

        self.persist(&state, !members.is_empty()).await?;
        info!(container = %self.container_id, source = %group_id, group = %group.id, members = members.len(), "Duplicated group");

        Ok(GroupWithMembers {
            member_ids: state.records.members_of(&group.id),
            group,
        })
    }
}

fn grouping(container: &Container) -> Result<Grouping, EngineError> {
    if !container.supports(GROUPED_FIELD) {
        return Err(EngineError::UnsupportedField {
            kind: container.kind,
            field: GROUPED_FIELD,
        });
    }
    Ok(Grouping {
        records: RecordList::from_value(GROUPED_FIELD, container.field(GROUPED_FIELD))?,
        groups: GroupSet::from_value(container.get(ACTION_CARD_GROUPS_PATH))?,
    })
}

/// Load the group list of `container`, treating an unsupported container as having none.
pub(crate) fn group_set(container: &Container) -> Result<GroupSet, EngineError> {
    if !container.supports(GROUPED_FIELD) {
        return Ok(GroupSet::default());
    }
    GroupSet::from_value(container.get(ACTION_CARD_GROUPS_PATH))
}
