//! Validated records.

use crate::error::{RepairError, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A JSON object proven to conform to a schema.
///
/// Only [`validate`](crate::schema::validate) constructs records, so holding
/// one means every field and constraint of the named schema was checked.
/// The object contains exactly the schema's declared fields, in declaration
/// order; absent optional fields are stored as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: String,
    fields: Map<String, Value>,
}

impl Record {
    pub(crate) fn new(schema: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            schema: schema.into(),
            fields,
        }
    }

    /// Name of the schema this record was validated against.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.str(field)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }

    pub fn strings(&self, field: &str) -> Option<Vec<&str>> {
        self.get(field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// The record as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.fields)?)
    }

    /// Deserialize the record into a typed struct.
    ///
    /// ```ignore
    /// let query: CustomerQuery = record.parse_as()?;
    /// ```
    pub fn parse_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            RepairError::Other(format!(
                "Failed to parse '{}' record into target type: {}",
                self.schema, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn record() -> Record {
        let Value::Object(fields) = json!({
            "name": "Joe",
            "order_id": 12345,
            "purchase_date": "2025-12-31",
            "is_complaint": false,
            "tags": ["a", "b"],
        }) else {
            unreachable!()
        };
        Record::new("sample", fields)
    }

    #[test]
    fn test_typed_accessors() {
        let r = record();
        assert_eq!(r.schema_name(), "sample");
        assert_eq!(r.str("name"), Some("Joe"));
        assert_eq!(r.int("order_id"), Some(12345));
        assert_eq!(r.bool("is_complaint"), Some(false));
        assert_eq!(r.date("purchase_date"), NaiveDate::from_ymd_opt(2025, 12, 31));
        assert_eq!(r.strings("tags"), Some(vec!["a", "b"]));
        assert_eq!(r.str("missing"), None);
    }

    #[test]
    fn test_field_order_preserved() {
        let r = record();
        let names: Vec<&str> = r.field_names().collect();
        assert_eq!(
            names,
            vec!["name", "order_id", "purchase_date", "is_complaint", "tags"]
        );
    }

    #[test]
    fn test_parse_as() {
        #[derive(Debug, Deserialize)]
        struct Partial {
            name: String,
            order_id: Option<u32>,
        }
        let p: Partial = record().parse_as().unwrap();
        assert_eq!(p.name, "Joe");
        assert_eq!(p.order_id, Some(12345));
    }

    #[test]
    fn test_parse_as_type_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Wrong {
            name: u32,
        }
        let err = record().parse_as::<Wrong>().unwrap_err();
        assert!(err.to_string().contains("'sample' record"));
    }
}
