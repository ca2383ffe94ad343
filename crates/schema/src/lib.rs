//! Schema metadata domain module.
//!
//! This crate contains the declared shape of dynamic entity types: versioned,
//! tenant-scoped `EntitySchema`s, their ordered `FieldDefinition`s, and the
//! validation engine that enforces a schema's field rules against candidate
//! JSON payloads. Pure domain logic (no IO, no HTTP, no storage).

pub mod field;
pub mod schema;
pub mod validation;

pub use field::{DataType, FieldDefinition, FieldSpec, FieldType, is_valid_field_name};
pub use schema::EntitySchema;
pub use validation::ValidationEngine;
