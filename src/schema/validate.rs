//! Validation of raw generator text against a [`Schema`].
//!
//! Validation never fails with an error: it returns a [`ValidationOutcome`].
//! An `Invalid` outcome lists *every* violated field in a single pass so that
//! one corrective turn can fix all of them. The checks themselves run on the
//! schema's compiled JSON Schema validator; its errors are mapped back onto
//! declared fields and reported in declaration order.

use super::{Field, FieldType, Record, Schema};
use crate::extract;
use jsonschema::error::ValidationErrorKind;
use serde_json::{Map, Number, Value};
use std::fmt;

/// How raw generator text is turned into JSON before field checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// The whole text must be one JSON object.
    #[default]
    Strict,
    /// Strip reasoning blocks, code fences and surrounding prose first.
    Lenient,
}

/// Result of validating one response.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Every field and constraint holds.
    Valid(Record),
    /// At least one problem; see the error for the full list.
    Invalid(ValidationError),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            ValidationOutcome::Valid(record) => Some(record),
            ValidationOutcome::Invalid(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            ValidationOutcome::Valid(_) => None,
            ValidationOutcome::Invalid(err) => Some(err),
        }
    }
}

/// Why a response was rejected.
///
/// The `Display` output is the description embedded in repair prompts and
/// returned to callers when the budget runs out.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The text is not a well-formed JSON object.
    Parse { message: String },
    /// Well-formed, but one or more fields break the schema.
    Schema {
        schema: String,
        violations: Vec<Violation>,
    },
}

impl ValidationError {
    /// The field violations, empty for parse errors.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationError::Parse { .. } => &[],
            ValidationError::Schema { violations, .. } => violations,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, ValidationError::Parse { .. })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Parse { message } => write!(f, "invalid JSON: {}", message),
            ValidationError::Schema { schema, violations } => {
                let plural = if violations.len() == 1 { "" } else { "s" };
                write!(
                    f,
                    "{} validation error{} for {}",
                    violations.len(),
                    plural,
                    schema
                )?;
                for v in violations {
                    write!(f, "\n{}", v)?;
                }
                Ok(())
            }
        }
    }
}

/// One failed check on one field.
///
/// `field` is the dotted path of the field (`address.zip`).
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: String,
    pub kind: ViolationKind,
}

/// What went wrong with a field.
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    Missing,
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
    BelowMinimum {
        min: i64,
        actual: Number,
    },
    AboveMaximum {
        max: i64,
        actual: Number,
    },
    NotInEnum {
        value: String,
        allowed: Vec<String>,
    },
    InvalidEmail {
        value: String,
    },
    InvalidDate {
        value: String,
    },
    InvalidListElement {
        index: usize,
        found: &'static str,
    },
    UnknownField,
    /// Any other broken constraint, described by the validator.
    Constraint {
        message: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = &self.field;
        match &self.kind {
            ViolationKind::Missing => write!(f, "{}: missing required field", field),
            ViolationKind::TypeMismatch { expected, found } => {
                write!(f, "{}: expected {}, found {}", field, expected, found)
            }
            ViolationKind::BelowMinimum { min, actual } => {
                write!(f, "{}: value {} below minimum {}", field, actual, min)
            }
            ViolationKind::AboveMaximum { max, actual } => {
                write!(f, "{}: value {} above maximum {}", field, actual, max)
            }
            ViolationKind::NotInEnum { value, allowed } => write!(
                f,
                "{}: '{}' is not one of the allowed values [{}]",
                field,
                value,
                allowed.join(", ")
            ),
            ViolationKind::InvalidEmail { value } => {
                write!(f, "{}: '{}' is not a valid email address", field, value)
            }
            ViolationKind::InvalidDate { value } => write!(
                f,
                "{}: '{}' is not a valid date (expected YYYY-MM-DD)",
                field, value
            ),
            ViolationKind::InvalidListElement { index, found } => {
                write!(f, "{}[{}]: expected string, found {}", field, index, found)
            }
            ViolationKind::UnknownField => write!(f, "{}: unexpected field", field),
            ViolationKind::Constraint { message } => write!(f, "{}: {}", field, message),
        }
    }
}

/// Validate raw text with [`ParseMode::Strict`].
pub fn validate(schema: &Schema, raw: &str) -> ValidationOutcome {
    validate_with(schema, raw, ParseMode::Strict)
}

/// Validate raw text, choosing how it is turned into JSON.
pub fn validate_with(schema: &Schema, raw: &str, mode: ParseMode) -> ValidationOutcome {
    let candidate = match mode {
        ParseMode::Strict => raw.trim().to_string(),
        ParseMode::Lenient => extract::json_candidate(raw),
    };

    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => validate_value(schema, &value),
        Err(e) => ValidationOutcome::Invalid(ValidationError::Parse {
            message: e.to_string(),
        }),
    }
}

/// Validate an already-parsed JSON value.
pub fn validate_value(schema: &Schema, value: &Value) -> ValidationOutcome {
    if !value.is_object() {
        return ValidationOutcome::Invalid(ValidationError::Parse {
            message: format!("expected a JSON object, found {}", json_type_name(value)),
        });
    }

    let mut value = value.clone();
    normalize_integers(schema, &mut value);

    let mut found = Vec::new();
    for err in schema.validator().iter_errors(&value) {
        let pointer = err.instance_path().to_string();
        let location = locate(schema, &pointer);
        let actual = value.pointer(&pointer);

        match err.kind() {
            ValidationErrorKind::Required { .. } => missing_fields(&location, actual, &mut found),
            ValidationErrorKind::AdditionalProperties { .. } => {
                unknown_fields(&location, actual, &mut found)
            }
            kind => {
                let (rank, kind) = classify(kind, location.target, actual).unwrap_or_else(|| {
                    (
                        1,
                        ViolationKind::Constraint {
                            message: err.to_string(),
                        },
                    )
                });
                found.push(Found {
                    order: location.order,
                    rank,
                    violation: Violation {
                        field: location.path,
                        kind,
                    },
                });
            }
        }
    }

    if found.is_empty() {
        let fields = match &value {
            Value::Object(object) => project(schema, object),
            _ => Map::new(),
        };
        return ValidationOutcome::Valid(Record::new(schema.name(), fields));
    }

    // One violation per location: a type mismatch hides the keyword checks
    // that fail along with it (an enum given a number fails both).
    found.sort_by(|a, b| a.order.cmp(&b.order).then(a.rank.cmp(&b.rank)));
    found.dedup_by(|next, kept| next.order == kept.order);

    ValidationOutcome::Invalid(ValidationError::Schema {
        schema: schema.name().to_string(),
        violations: found.into_iter().map(|f| f.violation).collect(),
    })
}

/// A mapped violation with its position in declaration order.
struct Found {
    order: Vec<usize>,
    rank: u8,
    violation: Violation,
}

/// Where an instance path points inside the declared fields.
#[derive(Clone, Copy)]
enum Target<'a> {
    Object(&'a Schema),
    Field(&'a Field),
    Element(&'a Field, usize),
    Unknown,
}

impl<'a> Target<'a> {
    fn object_schema(self) -> Option<&'a Schema> {
        match self {
            Target::Object(schema) => Some(schema),
            Target::Field(field) => match field.field_type() {
                FieldType::Object(schema) => Some(schema),
                _ => None,
            },
            _ => None,
        }
    }
}

struct Location<'a> {
    path: String,
    order: Vec<usize>,
    target: Target<'a>,
}

/// Resolve a JSON pointer (`/address/zip`, `/tags/1`) against the schema.
fn locate<'a>(schema: &'a Schema, pointer: &str) -> Location<'a> {
    let mut location = Location {
        path: String::new(),
        order: Vec::new(),
        target: Target::Object(schema),
    };

    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        location.target = match (location.target.object_schema(), location.target) {
            (Some(container), _) => {
                match container.fields().iter().position(|f| f.name() == segment) {
                    Some(i) => {
                        let field = &container.fields()[i];
                        location.path = join(&location.path, field.name());
                        location.order.push(i);
                        Target::Field(field)
                    }
                    None => Target::Unknown,
                }
            }
            (None, Target::Field(field)) if matches!(field.field_type(), FieldType::StringList) => {
                match segment.parse::<usize>() {
                    Ok(index) => {
                        location.order.push(index);
                        Target::Element(field, index)
                    }
                    Err(_) => Target::Unknown,
                }
            }
            _ => Target::Unknown,
        };
        if let Target::Unknown = location.target {
            location.path = join(&location.path, &segment);
            break;
        }
    }
    location
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

/// Map a keyword failure onto a field violation, with its precedence rank.
fn classify(
    kind: &ValidationErrorKind,
    target: Target<'_>,
    actual: Option<&Value>,
) -> Option<(u8, ViolationKind)> {
    let actual = actual?;
    let field = match target {
        Target::Element(_, index) => {
            return match kind {
                ValidationErrorKind::Type { .. } => Some((
                    0,
                    ViolationKind::InvalidListElement {
                        index,
                        found: json_type_name(actual),
                    },
                )),
                _ => None,
            };
        }
        Target::Field(field) => field,
        Target::Object(_) | Target::Unknown => return None,
    };
    let text = || actual.as_str().map(str::to_string).unwrap_or_else(|| actual.to_string());
    let (min, max) = field.bounds();

    let mapped = match (kind, field.field_type()) {
        (ValidationErrorKind::Type { .. }, ty) => (
            0,
            ViolationKind::TypeMismatch {
                expected: ty.label().to_string(),
                found: json_type_name(actual),
            },
        ),
        (ValidationErrorKind::Minimum { .. }, _) => (
            1,
            ViolationKind::BelowMinimum {
                min: min?,
                actual: actual.as_number()?.clone(),
            },
        ),
        (ValidationErrorKind::Maximum { .. }, _) => (
            1,
            ViolationKind::AboveMaximum {
                max: max?,
                actual: actual.as_number()?.clone(),
            },
        ),
        (ValidationErrorKind::Enum { .. }, FieldType::Enum(allowed)) => (
            1,
            ViolationKind::NotInEnum {
                value: text(),
                allowed: allowed.clone(),
            },
        ),
        (ValidationErrorKind::Format { .. }, FieldType::Email) => {
            (1, ViolationKind::InvalidEmail { value: text() })
        }
        (ValidationErrorKind::Format { .. }, FieldType::Date) => {
            (1, ViolationKind::InvalidDate { value: text() })
        }
        _ => return None,
    };
    Some(mapped)
}

/// Every required field absent from the object at `location`.
fn missing_fields(location: &Location<'_>, actual: Option<&Value>, found: &mut Vec<Found>) {
    let (Some(schema), Some(Value::Object(object))) = (location.target.object_schema(), actual)
    else {
        return;
    };
    for (i, field) in schema.fields().iter().enumerate() {
        if field.is_required() && !object.contains_key(field.name()) {
            let mut order = location.order.clone();
            order.push(i);
            found.push(Found {
                order,
                rank: 0,
                violation: Violation {
                    field: join(&location.path, field.name()),
                    kind: ViolationKind::Missing,
                },
            });
        }
    }
}

/// Every undeclared key of the object at `location`, after the declared fields.
fn unknown_fields(location: &Location<'_>, actual: Option<&Value>, found: &mut Vec<Found>) {
    let (Some(schema), Some(Value::Object(object))) = (location.target.object_schema(), actual)
    else {
        return;
    };
    for (i, key) in object.keys().enumerate() {
        if schema.field(key).is_none() {
            let mut order = location.order.clone();
            order.extend([usize::MAX, i]);
            found.push(Found {
                order,
                rank: 0,
                violation: Violation {
                    field: join(&location.path, key),
                    kind: ViolationKind::UnknownField,
                },
            });
        }
    }
}

/// Rewrite integral floats (`12345.0`) in integer fields as integers.
fn normalize_integers(schema: &Schema, value: &mut Value) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    for field in schema.fields() {
        let Some(v) = object.get_mut(field.name()) else {
            continue;
        };
        match field.field_type() {
            FieldType::Integer => {
                if let Some(n) = integral_float(v) {
                    *v = Value::from(n);
                }
            }
            FieldType::Object(sub) => normalize_integers(sub, v),
            _ => {}
        }
    }
}

/// Floats with no fractional part that fit an `i64`. 2^63 itself does not.
fn integral_float(value: &Value) -> Option<i64> {
    if value.is_i64() || value.is_u64() {
        return None;
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

/// The declared fields only, in declaration order; absent optionals are `null`.
fn project(schema: &Schema, object: &Map<String, Value>) -> Map<String, Value> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let value = match (object.get(field.name()), field.field_type()) {
                (Some(Value::Object(inner)), FieldType::Object(sub)) => {
                    Value::Object(project(sub, inner))
                }
                (Some(v), _) => v.clone(),
                (None, _) => Value::Null,
            };
            (field.name().to_string(), value)
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
