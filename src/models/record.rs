//! Records fetched from a backend and their uniform wrapper.

use crate::models::dbref::{DbRef, DeviceId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Field carrying the backend-native record identity inside a row.
pub const ID_FIELD: &str = "_id";

/// A materialized row: column or field name to value.
pub type Row = serde_json::Map<String, JsonValue>;

/// One row as handed out by a backend cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<String>,
    pub row: Row,
}

impl Record {
    /// Build a record, taking the identity from the `_id` field when present.
    pub fn from_row(row: Row) -> Self {
        let id = row.get(ID_FIELD).and_then(id_string);
        Self { id, row }
    }
}

/// Render an identity value as a string. Only scalars qualify.
pub fn id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Uniform schemaless wrapper around one record of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataObject {
    device: DeviceId,
    collection: String,
    row: Row,
}

impl DataObject {
    pub fn new(device: DeviceId, collection: impl Into<String>, row: Row) -> Self {
        Self {
            device,
            collection: collection.into(),
            row,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Backend-native identity, if the row carries one.
    pub fn id(&self) -> Option<String> {
        self.row.get(ID_FIELD).and_then(id_string)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.row.get(key)
    }

    /// Deserialize a field into `T`. Missing or mistyped fields yield `None`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.row
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Option<JsonValue> {
        self.row.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.row.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.row.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.row.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.row.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn into_row(self) -> Row {
        self.row
    }

    /// Reference to this record, or `None` when the row has no identity.
    pub fn to_dbref(&self) -> Option<DbRef> {
        self.id()
            .map(|id| DbRef::new(self.device.clone(), self.collection.clone(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_record_identity_from_number() {
        let record = Record::from_row(row(json!({"_id": 7, "name": "a"})));
        assert_eq!(record.id.as_deref(), Some("7"));
        assert!(Record::from_row(row(json!({"name": "a"}))).id.is_none());
    }

    #[test]
    fn test_data_object_access() {
        let mut obj = DataObject::new(
            DeviceId::from("dev"),
            "users",
            row(json!({"_id": "k1", "name": "ann", "age": 31})),
        );
        assert_eq!(obj.get("name"), Some(&json!("ann")));
        assert_eq!(obj.get_as::<u32>("age"), Some(31));
        assert_eq!(obj.get_as::<u32>("name"), None);
        obj.set("age", 32);
        assert_eq!(obj.get_as::<u32>("age"), Some(32));
        assert_eq!(obj.remove("name"), Some(json!("ann")));
        assert!(!obj.contains_key("name"));
        assert_eq!(obj.len(), 2);
    }

    #[test]
    fn test_data_object_dbref() {
        let obj = DataObject::new(DeviceId::from("dev"), "users", row(json!({"_id": 3})));
        let dbref = obj.to_dbref().unwrap();
        assert_eq!(dbref.device().as_str(), "dev");
        assert_eq!(dbref.collection(), "users");
        assert_eq!(dbref.id(), "3");

        let anonymous = DataObject::new(DeviceId::from("dev"), "users", Row::new());
        assert!(anonymous.to_dbref().is_none());
    }
}
