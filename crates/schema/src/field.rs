//! Field definitions: one declared attribute of an entity schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use dynerp_core::{AuditStamp, DomainError, DomainResult, FieldId, FieldViolation, SchemaId, UserId, ViolationCode};

/// UI-facing field type: decides which input widget renders the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Boolean,
    Dropdown,
    MultiSelect,
}

impl FieldType {
    /// Whether this field type constrains values to a declared option set.
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::Dropdown | Self::MultiSelect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Dropdown => "dropdown",
            Self::MultiSelect => "multiselect",
        }
    }
}

impl core::str::FromStr for FieldType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "boolean" => Ok(Self::Boolean),
            "dropdown" => Ok(Self::Dropdown),
            "multiselect" => Ok(Self::MultiSelect),
            other => Err(DomainError::invalid_id(format!("FieldType: '{other}'"))),
        }
    }
}

/// Storage-facing data type: decides how a payload value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Int,
    Decimal,
    Bool,
    DateTime,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Decimal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
        }
    }
}

impl core::str::FromStr for DataType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "int" => Ok(Self::Int),
            "decimal" => Ok(Self::Decimal),
            "bool" => Ok(Self::Bool),
            "datetime" => Ok(Self::DateTime),
            other => Err(DomainError::invalid_id(format!("DataType: '{other}'"))),
        }
    }
}

/// Whether `name` is a usable machine key.
///
/// Field names end up inside JSON path expressions, so they are restricted to
/// `[A-Za-z_][A-Za-z0-9_]*` before they ever reach a query builder.
pub fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Caller-supplied definition of a new field (no identity or audit yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_name: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub data_type: DataType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_searchable: bool,
    #[serde(default)]
    pub is_sortable: bool,
    /// Value filled in when a new record omits the field, rendered as text and
    /// coerced to `data_type` on use.
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub min_value: Option<f64>,
    /// Allowed values for choice field types.
    #[serde(default)]
    pub options: Option<Vec<JsonValue>>,
    /// Opaque rule payload; recognized keys (`pattern`, `message`) are applied,
    /// unknown keys are ignored for forward compatibility.
    #[serde(default)]
    pub validation_rules: Option<JsonValue>,
    #[serde(default)]
    pub order_index: i32,
}

impl FieldSpec {
    /// Minimal spec with everything optional left off.
    pub fn new(
        field_name: impl Into<String>,
        display_name: impl Into<String>,
        field_type: FieldType,
        data_type: DataType,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            display_name: display_name.into(),
            field_type,
            data_type,
            is_required: false,
            is_searchable: false,
            is_sortable: false,
            default_value: None,
            max_length: None,
            min_length: None,
            max_value: None,
            min_value: None,
            options: None,
            validation_rules: None,
            order_index: 0,
        }
    }
}

/// One declared attribute of an entity schema: name, type, constraints, order.
///
/// Field names are case-sensitive machine keys; `display_name` is
/// presentation-only and never used for lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub schema_id: SchemaId,
    pub field_name: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub data_type: DataType,
    pub is_required: bool,
    pub is_searchable: bool,
    pub is_sortable: bool,
    pub default_value: Option<String>,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub max_value: Option<f64>,
    pub min_value: Option<f64>,
    pub options: Option<Vec<JsonValue>>,
    pub validation_rules: Option<JsonValue>,
    /// Display/processing order. Not unique; ties break by `display_name`.
    pub order_index: i32,
    pub audit: AuditStamp,
}

impl FieldDefinition {
    /// Materialize a spec under a schema.
    ///
    /// Rejects names that are not valid machine keys; uniqueness within the
    /// schema is the owning schema's concern.
    pub fn from_spec(
        schema_id: SchemaId,
        spec: FieldSpec,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<Self> {
        if !is_valid_field_name(&spec.field_name) {
            return Err(DomainError::Validation(vec![FieldViolation::new(
                spec.field_name.clone(),
                ViolationCode::Pattern,
                "field name must start with a letter or underscore and contain only letters, digits and underscores",
            )]));
        }
        if spec.display_name.trim().is_empty() {
            return Err(DomainError::Validation(vec![FieldViolation::new(
                spec.field_name.clone(),
                ViolationCode::Required,
                "display name cannot be empty",
            )]));
        }

        Ok(Self {
            id: FieldId::new(),
            schema_id,
            field_name: spec.field_name,
            display_name: spec.display_name,
            field_type: spec.field_type,
            data_type: spec.data_type,
            is_required: spec.is_required,
            is_searchable: spec.is_searchable,
            is_sortable: spec.is_sortable,
            default_value: spec.default_value,
            max_length: spec.max_length,
            min_length: spec.min_length,
            max_value: spec.max_value,
            min_value: spec.min_value,
            options: spec.options,
            validation_rules: spec.validation_rules,
            order_index: spec.order_index,
            audit: AuditStamp::created(at, by),
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted
    }
}
