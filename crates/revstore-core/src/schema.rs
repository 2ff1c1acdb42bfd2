//! Schema contract and a declarative schema implementation.
//!
//! The access layer only needs a handful of operations from a schema: a
//! name to use as the table, whole-record and per-field validation and
//! cleaning, and a namespaced "special" section carrying backend storage
//! settings. [`RecordSchema`] covers the common case of typed fields with
//! required flags and defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::types::Record;

/// What the access layer consumes from a schema.
pub trait Schema: Send + Sync {
    /// Table name for records of this schema.
    fn name(&self) -> Option<&str>;

    /// Check a cleaned record.
    fn validate(&self, data: &Record) -> Result<(), ValidationError>;

    /// Coerce values and fill defaults.
    fn clean(&self, data: Record) -> Result<Record, ValidationError>;

    fn has_field(&self, field: &str) -> bool;

    fn validate_field(&self, field: &str, value: &Value) -> Result<(), ValidationError>;

    fn clean_field(&self, field: &str, value: Value) -> Result<Value, ValidationError>;

    /// Backend-specific settings stored under `namespace`.
    fn special(&self, namespace: &str) -> Option<Value>;

    fn is_valid(&self, data: &Record) -> bool {
        self.validate(data).is_ok()
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldType {
    fn accepts(self, v: &Value) -> bool {
        match self {
            FieldType::String => v.is_string(),
            FieldType::Number => v.is_number(),
            FieldType::Integer => v.is_i64() || v.is_u64(),
            FieldType::Boolean => v.is_boolean(),
            FieldType::Array => v.is_array(),
            FieldType::Object => v.is_object(),
            FieldType::Any => true,
        }
    }

    /// Lossless conversions from strings and whole floats.
    fn coerce(self, v: Value) -> Value {
        match (self, v) {
            (FieldType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(s),
            },
            (FieldType::Integer, Value::Number(n)) => match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Value::from(f as i64)
                }
                _ => Value::Number(n),
            },
            (FieldType::Number, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) => serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::String(s)),
                Err(_) => Value::String(s),
            },
            (FieldType::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(s),
            },
            (_, v) => v,
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn array() -> Self {
        Self::new(FieldType::Array)
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn any() -> Self {
        Self::new(FieldType::Any)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, v: impl Into<Value>) -> Self {
        self.default = Some(v.into());
        self
    }
}

/// A named set of typed fields.
///
/// Fields not declared here pass through `clean` and `validate` untouched,
/// so backend-managed fields such as `_id` and `_rev` never need declaring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default)]
    pub special: Map<String, Value>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A schema with no name. Usable for validation but not as a table.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn with_special(mut self, namespace: impl Into<String>, section: Value) -> Self {
        self.special.insert(namespace.into(), section);
        self
    }

    fn def(&self, field: &str) -> Result<&FieldDef, ValidationError> {
        self.fields.get(field).ok_or_else(|| ValidationError {
            field: field.to_string(),
            reason: "not declared".to_string(),
        })
    }
}

impl Schema for RecordSchema {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn validate(&self, data: &Record) -> Result<(), ValidationError> {
        for (name, def) in &self.fields {
            match data.get(name) {
                None | Some(Value::Null) if def.required => {
                    return Err(ValidationError {
                        field: name.clone(),
                        reason: "required".to_string(),
                    });
                }
                Some(v) if !v.is_null() => self.validate_field(name, v)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn clean(&self, mut data: Record) -> Result<Record, ValidationError> {
        for (name, def) in &self.fields {
            match data.remove(name) {
                Some(v) => {
                    let cleaned = self.clean_field(name, v)?;
                    data.insert(name.clone(), cleaned);
                }
                None => {
                    if let Some(default) = &def.default {
                        data.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(data)
    }

    fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    fn validate_field(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        let def = self.def(field)?;
        if value.is_null() {
            if def.required {
                return Err(ValidationError {
                    field: field.to_string(),
                    reason: "required".to_string(),
                });
            }
            return Ok(());
        }
        if !def.field_type.accepts(value) {
            return Err(ValidationError {
                field: field.to_string(),
                reason: format!("expected {:?}, got {value}", def.field_type),
            });
        }
        Ok(())
    }

    fn clean_field(&self, field: &str, value: Value) -> Result<Value, ValidationError> {
        let def = self.def(field)?;
        Ok(def.field_type.coerce(value))
    }

    fn special(&self, namespace: &str) -> Option<Value> {
        self.special.get(namespace).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> RecordSchema {
        RecordSchema::new("users")
            .field("email", FieldDef::string().required())
            .field("age", FieldDef::integer().default_value(0))
            .field("tags", FieldDef::array())
            .with_special("revstore", json!({"revisions": true}))
    }

    fn rec(v: Value) -> Record {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_clean_fills_defaults_and_coerces() {
        let s = users();
        let out = s.clean(rec(json!({"email": "a@x", "extra": 1}))).unwrap();
        assert_eq!(Value::Object(out), json!({"email": "a@x", "age": 0, "extra": 1}));

        let out = s.clean(rec(json!({"email": "a@x", "age": "42"}))).unwrap();
        assert_eq!(out["age"], json!(42));

        let out = s.clean(rec(json!({"email": "a@x", "age": 7.0}))).unwrap();
        assert_eq!(out["age"], json!(7));
    }

    #[test]
    fn test_validate_required_and_types() {
        let s = users();
        assert!(s.is_valid(&rec(json!({"email": "a@x", "age": 3}))));
        assert!(!s.is_valid(&rec(json!({"age": 3}))));
        assert!(!s.is_valid(&rec(json!({"email": null}))));

        let err = s.validate(&rec(json!({"email": "a@x", "age": "old"}))).unwrap_err();
        assert_eq!(err.field, "age");
    }

    #[test]
    fn test_field_level_checks() {
        let s = users();
        assert!(s.has_field("email"));
        assert!(!s.has_field("_id"));
        assert!(s.validate_field("tags", &json!(["a"])).is_ok());
        assert!(s.validate_field("tags", &json!("a")).is_err());
        assert!(s.validate_field("nope", &json!(1)).is_err());
        assert_eq!(s.clean_field("age", json!("5")).unwrap(), json!(5));
    }

    #[test]
    fn test_special_and_name() {
        let s = users();
        assert_eq!(s.name(), Some("users"));
        assert_eq!(s.special("revstore"), Some(json!({"revisions": true})));
        assert_eq!(s.special("other"), None);
        assert_eq!(RecordSchema::anonymous().name(), None);
    }

    #[test]
    fn test_schema_from_json() {
        let s: RecordSchema = serde_json::from_value(json!({
            "name": "posts",
            "fields": {
                "title": {"type": "string", "required": true},
                "votes": {"type": "integer", "default": 0}
            },
            "special": {"revstore": {"indexes": {"title": null}}}
        }))
        .unwrap();
        assert_eq!(s.name(), Some("posts"));
        assert!(s.fields["title"].required);
        assert_eq!(s.fields["votes"].default, Some(json!(0)));
    }
}
