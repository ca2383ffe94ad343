//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Machine-readable code for one field-level validation failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    /// Required field is missing or empty.
    Required,
    /// Value does not parse as the field's declared data type.
    TypeMismatch,
    /// String shorter than the declared minimum length.
    MinLength,
    /// String longer than the declared maximum length.
    MaxLength,
    /// Number outside the declared inclusive bounds.
    OutOfRange,
    /// Value is not one of the field's declared options.
    NotAnOption,
    /// Value does not match the declared pattern rule.
    Pattern,
    /// Payload key is not declared in the schema's field catalog.
    UnknownField,
}

impl ViolationCode {
    /// Stable machine code, suitable for API responses and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::TypeMismatch => "type_mismatch",
            Self::MinLength => "min_length",
            Self::MaxLength => "max_length",
            Self::OutOfRange => "out_of_range",
            Self::NotAnOption => "not_an_option",
            Self::Pattern => "pattern",
            Self::UnknownField => "unknown_field",
        }
    }
}

/// One accumulated field-level validation failure.
///
/// A validation pass never stops at the first failure; callers receive every
/// violation at once so a payload can be fixed in a single round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Machine key of the offending field (or the undeclared payload key).
    pub field: String,
    pub code: ViolationCode,
    /// Human-readable message rendered from the message catalog, or the
    /// custom message carried by a pattern rule.
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Callers map each variant to a distinct transport
/// response; storage failures surface as the generic `Storage` variant so an
/// outer layer can decide on retry policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced schema, field or record does not exist or is soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or concurrency invariant was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A payload failed one or more field-level rules (fully accumulated).
    #[error("validation failed: {} violation(s)", .0.len())]
    Validation(Vec<FieldViolation>),

    /// A query named a field that is not declared (or not allowed) for the schema.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// An operation's tenant does not match the resolved schema's tenant.
    #[error("tenant mismatch: {0}")]
    TenantMismatch(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Infrastructure-level failure (storage unavailable, IO). Not retried here.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField(name.into())
    }

    pub fn tenant_mismatch(msg: impl Into<String>) -> Self {
        Self::TenantMismatch(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// The accumulated violations, if this is a validation failure.
    pub fn violations(&self) -> Option<&[FieldViolation]> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }
}
