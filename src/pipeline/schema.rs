//! Output contracts compiled from caller JSON schemas.
//!
//! An [`OutputContract`] is an ordered list of `(name, kind, required)`
//! fields. Backends receive the contract itself (and can render it back to
//! a JSON schema for `response_format`) instead of a type synthesised at
//! run time.

use crate::error::AnalyzerError;
use serde_json::{json, Map, Value};

/// Primitive kind of one contract field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Float,
    Int,
    Bool,
    Sequence,
    Mapping,
}

impl FieldKind {
    /// JSON-schema type name → kind; unknown or missing names are strings.
    pub fn from_schema_type(name: Option<&str>) -> Self {
        match name {
            Some("number") => FieldKind::Float,
            Some("integer") => FieldKind::Int,
            Some("boolean") => FieldKind::Bool,
            Some("array") => FieldKind::Sequence,
            Some("object") => FieldKind::Mapping,
            _ => FieldKind::String,
        }
    }

    pub fn schema_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Float => "number",
            FieldKind::Int => "integer",
            FieldKind::Bool => "boolean",
            FieldKind::Sequence => "array",
            FieldKind::Mapping => "object",
        }
    }

    /// Whether `value` is acceptable for this kind. Integers count as floats.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Float => value.is_number(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Sequence => value.is_array(),
            FieldKind::Mapping => value.is_object(),
        }
    }
}

/// One named field of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Ordered field set the model's structured output must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputContract {
    pub fields: Vec<FieldSpec>,
}

impl OutputContract {
    /// Compile a JSON-schema-like description.
    ///
    /// Only `properties` and `required` are read. A missing or empty
    /// `properties` yields a contract with zero fields.
    pub fn compile(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let fields = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, def)| FieldSpec {
                        name: name.clone(),
                        kind: FieldKind::from_schema_type(def.get("type").and_then(Value::as_str)),
                        required: required.contains(&name.as_str()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render back to a JSON schema; optional fields are nullable.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let ty = if field.required {
                json!(field.kind.schema_type())
            } else {
                json!([field.kind.schema_type(), "null"])
            };
            properties.insert(field.name.clone(), json!({ "type": ty }));
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "title": "DynamicResult",
            "properties": properties,
            "required": required,
        })
    }

    /// Shape a model's object to the contract.
    ///
    /// Required fields must be present and non-null, present values must
    /// match their kind, missing optional fields become `null`, and fields
    /// outside the contract are dropped. Output follows contract order.
    pub fn conform(&self, mut object: Map<String, Value>) -> Result<Map<String, Value>, AnalyzerError> {
        let mut out = Map::new();
        for field in &self.fields {
            let value = object.remove(&field.name).unwrap_or(Value::Null);
            if value.is_null() {
                if field.required {
                    return Err(AnalyzerError::MalformedResponse(format!(
                        "structured output is missing required field '{}'",
                        field.name
                    )));
                }
            } else if !field.kind.accepts(&value) {
                return Err(AnalyzerError::MalformedResponse(format!(
                    "structured output field '{}' should be {}, got {}",
                    field.name,
                    field.kind.schema_type(),
                    value
                )));
            }
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "count": {"type": "integer"},
                "score": {"type": "number"},
                "ok": {"type": "boolean"},
                "tags": {"type": "array"},
                "meta": {"type": "object"},
                "free": {}
            },
            "required": ["title", "count", "ghost"]
        })
    }

    #[test]
    fn kinds_and_required_flags() {
        let c = OutputContract::compile(&sample());
        let summary: Vec<(&str, FieldKind, bool)> = c
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.kind, f.required))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("title", FieldKind::String, true),
                ("count", FieldKind::Int, true),
                ("score", FieldKind::Float, false),
                ("ok", FieldKind::Bool, false),
                ("tags", FieldKind::Sequence, false),
                ("meta", FieldKind::Mapping, false),
                ("free", FieldKind::String, false),
            ]
        );
    }

    #[test]
    fn required_names_outside_properties_are_ignored() {
        let c = OutputContract::compile(&sample());
        assert!(c.fields.iter().all(|f| f.name != "ghost"));
    }

    #[test]
    fn empty_properties_yield_empty_contract() {
        assert!(OutputContract::compile(&json!({"properties": {}})).is_empty());
        assert!(OutputContract::compile(&json!({"type": "object"})).is_empty());
    }

    #[test]
    fn unknown_type_defaults_to_string() {
        let c = OutputContract::compile(&json!({"properties": {"x": {"type": "date"}}}));
        assert_eq!(c.fields[0].kind, FieldKind::String);
    }

    #[test]
    fn schema_round_trip_marks_optionals_nullable() {
        let c = OutputContract::compile(&json!({
            "properties": {"a": {"type": "string"}, "b": {"type": "integer"}},
            "required": ["a"]
        }));
        let s = c.to_json_schema();
        assert_eq!(s["properties"]["a"]["type"], json!("string"));
        assert_eq!(s["properties"]["b"]["type"], json!(["integer", "null"]));
        assert_eq!(s["required"], json!(["a"]));
    }

    #[test]
    fn conform_fills_optionals_and_drops_extras() {
        let c = OutputContract::compile(&sample());
        let input = json!({"count": 2, "title": "cats", "extra": true})
            .as_object()
            .cloned()
            .unwrap();
        let out = c.conform(input).unwrap();
        let keys: Vec<&String> = out.keys().collect();
        assert_eq!(keys, vec!["title", "count", "score", "ok", "tags", "meta", "free"]);
        assert_eq!(out["score"], Value::Null);
        assert!(!out.contains_key("extra"));
    }

    #[test]
    fn conform_rejects_missing_required() {
        let c = OutputContract::compile(&sample());
        let err = c
            .conform(json!({"title": "x"}).as_object().cloned().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("count"));
    }

    #[test]
    fn conform_rejects_wrong_kind_but_accepts_int_as_number() {
        let c = OutputContract::compile(&json!({
            "properties": {"n": {"type": "integer"}, "x": {"type": "number"}},
            "required": ["n"]
        }));
        assert!(c
            .conform(json!({"n": "two"}).as_object().cloned().unwrap())
            .is_err());
        assert!(c
            .conform(json!({"n": 2, "x": 3}).as_object().cloned().unwrap())
            .is_ok());
    }
}
