use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A named, orderable bucket of embedded records inside one container.
///
/// Groups do not list their members. A record joins a group by carrying the
/// group's id in its `group` field, so membership is always derived from the
/// records themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default = "first_sort")]
    pub sort: Number,
    #[serde(default)]
    pub collapsed: bool,
    /// Set for groups created without members; such a group is kept while
    /// empty until a record joins it for the first time.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl Group {
    /// The sort value as a float, for ordering.
    pub fn position(&self) -> f64 {
        self.sort.as_f64().unwrap_or_default()
    }
}

fn first_sort() -> Number {
    Number::from(0)
}

/// Input for creating a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupInput {
    pub name: String,
    /// Records to move into the new group. An empty list creates a placeholder group.
    #[serde(default)]
    pub member_ids: Vec<String>,
}

/// Input for updating a group. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGroupInput {
    pub name: Option<String>,
    pub collapsed: Option<bool>,
    pub sort: Option<Number>,
}

/// A group together with the ids of the records that currently reference it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupWithMembers {
    #[serde(flatten)]
    pub group: Group,
    pub member_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fractional_sorts_decode_unchanged() {
        let group: Group = serde_json::from_value(json!({ "id": "g", "name": "A", "sort": 2.5 })).unwrap();
        assert_eq!(group.position(), 2.5);
        assert_eq!(serde_json::to_value(&group).unwrap()["sort"], json!(2.5));
    }

    #[test]
    fn missing_sorts_default_to_zero() {
        let group: Group = serde_json::from_value(json!({ "id": "g", "name": "A" })).unwrap();
        assert_eq!(group.sort, Number::from(0));
    }
}
