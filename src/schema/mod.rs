//! Declarative schemas for generator output.
//!
//! A [`Schema`] is a named, ordered list of [`Field`]s. Each field carries its
//! type, constraints, a short description and an example value. The same
//! declaration drives three things:
//!
//! - validation of raw model output ([`Schema::validate`]), through a JSON
//!   Schema validator compiled once when the schema is built,
//! - the example structure shown to the model ([`Schema::example_json`]),
//! - the JSON Schema handed to providers with native structured output
//!   ([`Schema::to_json_schema`]).
//!
//! Derived schemas are built with [`Schema::extend`]: the base's fields come
//! first, followed by the additions. Structured sub-objects are declared with
//! [`Field::object`]; their violations are reported under dotted paths
//! (`address.zip`).
//!
//! # Example
//!
//! ```
//! use llm_repair_loop::schema::{Field, Schema};
//!
//! let base = Schema::builder("ticket")
//!     .field(Field::string("title").example("Broken monitor"))
//!     .build()
//!     .unwrap();
//!
//! let triaged = Schema::extend(&base, "triaged_ticket")
//!     .field(Field::enumeration("severity", &["low", "high"]).example("low"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(triaged.field_names(), vec!["title", "severity"]);
//! ```

pub mod customer;
pub mod record;
pub mod validate;

pub use record::Record;
pub use validate::{
    validate, validate_value, validate_with, ParseMode, ValidationError, ValidationOutcome,
    Violation, ViolationKind,
};

use crate::error::{RepairError, Result};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Any JSON string.
    String,
    /// A string that must look like an email address.
    Email,
    /// A whole number, optionally bounded.
    Integer,
    /// Any JSON number.
    Number,
    /// A calendar date as `YYYY-MM-DD`.
    Date,
    /// `true` or `false`.
    Boolean,
    /// One of a fixed set of string literals.
    Enum(Vec<String>),
    /// An array of strings.
    StringList,
    /// A nested object described by its own schema.
    Object(Schema),
}

impl FieldType {
    /// Short human-readable name used in violation messages.
    pub fn label(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Email => "email string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Date => "date string",
            FieldType::Boolean => "boolean",
            FieldType::Enum(_) => "string",
            FieldType::StringList => "list of strings",
            FieldType::Object(_) => "object",
        }
    }

    fn placeholder(&self) -> Value {
        match self {
            FieldType::String => json!("string"),
            FieldType::Email => json!("user@example.com"),
            FieldType::Integer => json!(0),
            FieldType::Number => json!(0.0),
            FieldType::Date => json!("2025-01-01"),
            FieldType::Boolean => json!(false),
            FieldType::Enum(values) => values
                .first()
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null),
            FieldType::StringList => json!(["string"]),
            FieldType::Object(schema) => schema.example_value(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Enum(values) => write!(f, "one of [{}]", values.join(", ")),
            FieldType::Object(schema) => write!(f, "object {}", schema.name()),
            other => f.write_str(other.label()),
        }
    }
}

/// A single named field of a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    ty: FieldType,
    required: bool,
    min: Option<i64>,
    max: Option<i64>,
    description: Option<String>,
    example: Option<Value>,
}

impl Field {
    /// Create a required field of the given type.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            min: None,
            max: None,
            description: None,
            example: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn email(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Email)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn string_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::StringList)
    }

    /// A string field restricted to the given literals.
    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(
            name,
            FieldType::Enum(values.iter().map(|v| v.to_string()).collect()),
        )
    }

    /// A nested object validated against `schema`.
    pub fn object(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, FieldType::Object(schema))
    }

    /// Mark the field optional: it may be absent or `null`.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Inclusive bounds for an integer field.
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Inclusive lower bound for an integer field.
    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    /// Inclusive upper bound for an integer field.
    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Example value shown to the model in the target structure.
    pub fn example(mut self, example: impl Into<Value>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn bounds(&self) -> (Option<i64>, Option<i64>) {
        (self.min, self.max)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The declared example, or a type-derived placeholder.
    pub fn example_value(&self) -> Value {
        self.example
            .clone()
            .unwrap_or_else(|| match (&self.ty, self.min) {
                (FieldType::Integer, Some(min)) => json!(min),
                (ty, _) => ty.placeholder(),
            })
    }

    /// Property schema. `for_provider` selects the strict form sent to
    /// structured-output providers for nested objects.
    fn json_schema(&self, for_provider: bool) -> Value {
        let mut prop = match &self.ty {
            FieldType::String => json!({"type": "string"}),
            FieldType::Email => json!({"type": "string", "format": "email"}),
            FieldType::Integer => {
                let mut p = json!({"type": "integer"});
                if let Some(min) = self.min {
                    p["minimum"] = json!(min);
                }
                if let Some(max) = self.max {
                    p["maximum"] = json!(max);
                }
                p
            }
            FieldType::Number => json!({"type": "number"}),
            FieldType::Date => json!({"type": "string", "format": "date"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::Enum(values) => json!({"type": "string", "enum": values}),
            FieldType::StringList => json!({"type": "array", "items": {"type": "string"}}),
            FieldType::Object(schema) if for_provider => schema.to_json_schema(),
            FieldType::Object(schema) => schema.validation_schema(),
        };

        // Optional fields are expressed as nullable so every property can be
        // listed under `required` (strict structured-output providers demand it).
        if !self.required {
            let base = prop["type"].clone();
            prop["type"] = json!([base, "null"]);
            if let Some(values) = prop.get_mut("enum").and_then(|v| v.as_array_mut()) {
                values.push(Value::Null);
            }
        }
        if let Some(ref desc) = self.description {
            prop["description"] = json!(desc);
        }
        prop
    }
}

/// A named, ordered, immutable set of typed fields.
#[derive(Clone)]
pub struct Schema {
    name: String,
    base: Option<String>,
    fields: Vec<Field>,
    deny_unknown: bool,
    validator: Arc<jsonschema::Validator>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("fields", &self.fields)
            .field("deny_unknown", &self.deny_unknown)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.base == other.base
            && self.fields == other.fields
            && self.deny_unknown == other.deny_unknown
    }
}

impl Schema {
    /// Start declaring a new schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            base: None,
            fields: Vec::new(),
            deny_unknown: false,
        }
    }

    /// Start declaring a schema that contains every field of `base`
    /// followed by the fields added on the returned builder.
    pub fn extend(base: &Schema, name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            base: Some(base.name.clone()),
            fields: base.fields.clone(),
            deny_unknown: base.deny_unknown,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the schema this one was extended from, if any.
    pub fn base_name(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Whether keys outside the declared fields are reported as violations.
    pub fn denies_unknown_fields(&self) -> bool {
        self.deny_unknown
    }

    pub(crate) fn validator(&self) -> &jsonschema::Validator {
        &self.validator
    }

    /// Validate raw generator text against this schema (strict JSON parsing).
    pub fn validate(&self, raw: &str) -> ValidationOutcome {
        validate::validate(self, raw)
    }

    /// Example object built from every field's example value, in field order.
    pub fn example_value(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            map.insert(field.name.clone(), field.example_value());
        }
        Value::Object(map)
    }

    /// Pretty-printed example object for embedding in prompts.
    pub fn example_json(&self) -> String {
        serde_json::to_string_pretty(&self.example_value()).unwrap_or_default()
    }

    /// JSON Schema (draft 2020-12 subset) describing this schema.
    ///
    /// Every property is listed under `required`; optional fields are typed
    /// as nullable instead.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.json_schema(true));
        }
        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": self.field_names(),
            "additionalProperties": false,
        })
    }

    /// The document the validator is compiled from: only required fields
    /// are listed under `required`, and extra keys are allowed unless the
    /// schema denies them.
    pub(crate) fn validation_schema(&self) -> Value {
        validation_document(&self.fields, self.deny_unknown)
    }
}

fn validation_document(fields: &[Field], deny_unknown: bool) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(field.name.clone(), field.json_schema(false));
    }
    let required: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();

    let mut doc = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    if deny_unknown {
        doc["additionalProperties"] = json!(false);
    }
    doc
}

/// Builder for [`Schema`]. Consistency checks run in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    base: Option<String>,
    fields: Vec<Field>,
    deny_unknown: bool,
}

impl SchemaBuilder {
    /// Append a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Report keys not declared by the schema as violations.
    pub fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    /// Finish the declaration.
    ///
    /// Fails on duplicate field names, empty enumerations, inverted bounds,
    /// or bounds on a non-integer field.
    pub fn build(self) -> Result<Schema> {
        let invalid = |message: String| RepairError::InvalidSchema {
            schema: self.name.clone(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("schema name must not be empty".into()));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(invalid("field name must not be empty".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            if let FieldType::Enum(values) = &field.ty {
                if values.is_empty() {
                    return Err(invalid(format!(
                        "enumeration '{}' has no allowed values",
                        field.name
                    )));
                }
            }
            if (field.min.is_some() || field.max.is_some())
                && !matches!(field.ty, FieldType::Integer)
            {
                return Err(invalid(format!(
                    "bounds are only supported on integer fields ('{}' is {})",
                    field.name,
                    field.ty.label()
                )));
            }
            if let (Some(min), Some(max)) = (field.min, field.max) {
                if min > max {
                    return Err(invalid(format!(
                        "field '{}' has minimum {} greater than maximum {}",
                        field.name, min, max
                    )));
                }
            }
        }
        drop(seen);

        let document = validation_document(&self.fields, self.deny_unknown);
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(&document)
            .map_err(|e| invalid(format!("cannot compile validator: {}", e)))?;

        Ok(Schema {
            name: self.name,
            base: self.base,
            fields: self.fields,
            deny_unknown: self.deny_unknown,
            validator: Arc::new(validator),
        })
    }
}
