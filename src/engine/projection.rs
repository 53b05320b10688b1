//! Id-keyed view of a container's record list.
//!
//! Lists are stored as ordered arrays. Inside the engine they are handled as
//! an ordered map from record id to the raw record, so edits address records
//! by id and never by position. Records nobody touches stay as the exact JSON
//! that was read.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::error::{json_type_name, EngineError};
use crate::field_path;
use crate::models::{generate_id, EmbeddedField, EmbeddedRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordList {
    field: EmbeddedField,
    records: IndexMap<String, Value>,
    repaired: Vec<String>,
}

impl RecordList {
    pub fn new(field: EmbeddedField) -> Self {
        Self {
            field,
            records: IndexMap::new(),
            repaired: Vec::new(),
        }
    }

    /// Project a stored list value.
    ///
    /// An unset field is an empty list. Records without an id, or repeating
    /// an id already seen, are given fresh ids and reported by [`repaired`](Self::repaired).
    pub fn from_value(field: EmbeddedField, value: Option<Value>) -> Result<Self, EngineError> {
        let items = match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(EngineError::FieldShape {
                    field,
                    expected: "a list",
                    found: json_type_name(&other),
                })
            }
        };

        let mut list = Self::new(field);
        for item in items {
            let mut map = match item {
                Value::Object(map) => map,
                other => {
                    return Err(EngineError::MalformedRecord(format!(
                        "{} contains {}",
                        field,
                        json_type_name(&other)
                    )))
                }
            };

            let existing = map
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty() && !list.records.contains_key(*id))
                .map(str::to_string);

            let id = match existing {
                Some(id) => id,
                None => {
                    let fresh = generate_id();
                    warn!(
                        field = %field,
                        previous = ?map.get("id"),
                        record = %fresh,
                        "Record without a unique id, assigned a fresh one"
                    );
                    map.insert("id".to_string(), Value::String(fresh.clone()));
                    list.repaired.push(fresh.clone());
                    fresh
                }
            };
            list.records.insert(id, Value::Object(map));
        }

        Ok(list)
    }

    pub fn field(&self) -> EmbeddedField {
        self.field
    }

    /// Ids assigned while projecting.
    pub fn repaired(&self) -> &[String] {
        &self.repaired
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.records.get(id)
    }

    pub fn decode(&self, id: &str) -> Result<EmbeddedRecord, EngineError> {
        let value = self
            .records
            .get(id)
            .ok_or_else(|| EngineError::record_not_found(self.field, id))?;
        EmbeddedRecord::from_value(value.clone())
            .map_err(|e| EngineError::MalformedRecord(e.to_string()))
    }

    /// Replace the record with the same id in place, or append it.
    pub fn put(&mut self, record: &EmbeddedRecord) -> Result<(), EngineError> {
        let mut value = record.to_value()?;
        match self.records.get_mut(&record.id) {
            Some(slot) => {
                field_path::keep_nulls(slot, &mut value);
                *slot = value;
            }
            None => {
                self.records.insert(record.id.clone(), value);
            }
        }
        Ok(())
    }

    pub fn push(&mut self, record: &EmbeddedRecord) -> Result<(), EngineError> {
        self.records.insert(record.id.clone(), record.to_value()?);
        Ok(())
    }

    /// Insert directly after `anchor`, or at the end if `anchor` is absent.
    pub fn insert_after(&mut self, anchor: &str, record: &EmbeddedRecord) -> Result<(), EngineError> {
        let index = self
            .records
            .get_index_of(anchor)
            .map_or(self.records.len(), |i| i + 1);
        self.records
            .shift_insert(index, record.id.clone(), record.to_value()?);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Value> {
        self.records.shift_remove(id)
    }

    pub fn group_of(&self, id: &str) -> Option<&str> {
        self.records
            .get(id)
            .and_then(|value| value.get("group"))
            .and_then(Value::as_str)
    }

    /// Point the record at `group`, or clear its group. Returns the previous group.
    pub fn set_group(&mut self, id: &str, group: Option<&str>) -> Option<String> {
        let map = self.records.get_mut(id)?.as_object_mut()?;
        let previous = match group {
            Some(group) => map.insert("group".to_string(), Value::String(group.to_string())),
            None => map.remove("group"),
        };
        previous.and_then(|v| v.as_str().map(str::to_string))
    }

    /// Ids of the records referencing `group_id`, in list order.
    pub fn members_of(&self, group_id: &str) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, value)| value.get("group").and_then(Value::as_str) == Some(group_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The largest whole `sort` in the list; fractional sorts round down.
    pub fn max_sort(&self) -> i64 {
        self.records
            .values()
            .filter_map(|value| value.get("sort").and_then(Value::as_f64))
            .reduce(f64::max)
            .map_or(0, |sort| sort.floor() as i64)
    }

    /// Rewrite `sort` so the given ids come first, in order, followed by the rest.
    pub fn reorder(&mut self, ordered_ids: &[String]) -> Result<(), EngineError> {
        if let Some(missing) = ordered_ids.iter().find(|id| !self.records.contains_key(*id)) {
            return Err(EngineError::record_not_found(self.field, missing.clone()));
        }

        let mut order: Vec<String> = ordered_ids.to_vec();
        order.extend(
            self.records
                .keys()
                .filter(|id| !ordered_ids.contains(id))
                .cloned(),
        );

        let mut reordered = IndexMap::with_capacity(self.records.len());
        for (position, id) in order.into_iter().enumerate() {
            if let Some(mut value) = self.records.shift_remove(&id) {
                if let Some(map) = value.as_object_mut() {
                    map.insert("sort".to_string(), Value::from(position as i64));
                }
                reordered.insert(id, value);
            }
        }
        self.records = reordered;
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list(value: Value) -> RecordList {
        RecordList::from_value(EmbeddedField::ActionCards, Some(value)).unwrap()
    }

    #[test]
    fn unset_field_is_empty() {
        let list = RecordList::from_value(EmbeddedField::Effects, None).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.to_value(), json!([]));
    }

    #[test]
    fn non_list_value_is_rejected() {
        let err = RecordList::from_value(EmbeddedField::Effects, Some(json!({ "id": "a" })))
            .unwrap_err();
        assert!(matches!(err, EngineError::FieldShape { found: "an object", .. }));
    }

    #[test]
    fn projection_round_trips_untouched_records() {
        let value = json!([
            { "id": "a", "kind": "actionCard", "weird": [1, 2.5, null] },
            { "id": "b", "kind": "actionCard" }
        ]);
        assert_eq!(list(value.clone()).to_value(), value);
    }

    #[test]
    fn missing_and_duplicate_ids_are_repaired() {
        let list = list(json!([
            { "id": "a" },
            { "kind": "actionCard" },
            { "id": "a", "name": "twin" }
        ]));

        assert_eq!(list.len(), 3);
        assert_eq!(list.repaired().len(), 2);
        let ids: Vec<_> = list.ids().cloned().collect();
        assert_eq!(ids[0], "a");
        assert_ne!(ids[1], "a");
        assert_ne!(ids[2], "a");
        assert_eq!(list.get(&ids[2]).unwrap()["name"], json!("twin"));
    }

    #[test]
    fn groups_are_read_and_written_on_raw_records() {
        let mut list = list(json!([
            { "id": "a", "group": "g1" },
            { "id": "b", "group": "g1" },
            { "id": "c" }
        ]));

        assert_eq!(list.members_of("g1"), vec!["a", "b"]);
        assert_eq!(list.set_group("a", None), Some("g1".to_string()));
        assert_eq!(list.set_group("c", Some("g1")), None);
        assert_eq!(list.members_of("g1"), vec!["b", "c"]);
        assert_eq!(list.get("a").unwrap(), &json!({ "id": "a" }));
    }

    #[test]
    fn insert_after_keeps_neighbours_in_place() {
        let mut list = list(json!([{ "id": "a", "kind": "x" }, { "id": "c", "kind": "x" }]));
        let record = EmbeddedRecord::from_value(json!({ "id": "b", "kind": "x" })).unwrap();

        list.insert_after("a", &record).unwrap();

        let ids: Vec<_> = list.ids().cloned().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn reorder_rewrites_sort_and_rejects_unknown_ids() {
        let mut list = list(json!([{ "id": "a" }, { "id": "b" }, { "id": "c" }]));

        list.reorder(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(
            list.to_value(),
            json!([
                { "id": "c", "sort": 0 },
                { "id": "a", "sort": 1 },
                { "id": "b", "sort": 2 }
            ])
        );

        let err = list.reorder(&["zzz".to_string()]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn max_sort_accepts_fractional_sorts() {
        let list = list(json!([
            { "id": "a", "sort": 2 },
            { "id": "b", "sort": 150000.5 },
            { "id": "c" }
        ]));
        assert_eq!(list.max_sort(), 150000);
        assert_eq!(RecordList::new(EmbeddedField::Effects).max_sort(), 0);
    }

    #[test]
    fn put_keeps_explicit_nulls() {
        let stored = json!([{ "id": "a", "kind": "action", "name": null, "effects": null }]);
        let mut list = list(stored.clone());
        let record = list.decode("a").unwrap();

        list.put(&record).unwrap();

        assert_eq!(list.to_value(), stored);
    }
}
