//! Per-field validation schema for `ContextManager`.

use serde_json::Value as Json;
use std::collections::BTreeMap;

/// The scalar/compound shape a field may be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldType {
    pub fn matches(&self, value: &Json) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_f64() || value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Any => true,
        }
    }
}

/// Validation rules for a single dot-path field.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    pub required: bool,
    pub field_type: Option<FieldType>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub regex: Option<String>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn field_type(mut self, ty: FieldType) -> Self {
        self.field_type = Some(ty);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    /// Validate a present value against this field's rules. Absence is
    /// handled by the caller (`ContextManager::self_validate`), since a
    /// missing optional field is not an error here.
    pub fn validate(&self, value: &Json) -> Result<(), String> {
        if let Some(ty) = self.field_type {
            if !ty.matches(value) {
                return Err(format!("expected {ty:?}, got {value}"));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min {
                if n < min {
                    return Err(format!("{n} is below minimum {min}"));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    return Err(format!("{n} is above maximum {max}"));
                }
            }
        }

        if let (Some(pattern), Some(s)) = (&self.regex, value.as_str()) {
            let re = regex::Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
            if !re.is_match(s) {
                return Err(format!("'{s}' does not match pattern '{pattern}'"));
            }
        }

        Ok(())
    }
}

/// A named collection of field schemas, keyed by dot-path.
#[derive(Debug, Clone, Default)]
pub struct ContextSchema {
    fields: BTreeMap<String, FieldSchema>,
}

impl ContextSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, path: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(path.into(), schema);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter()
    }
}
