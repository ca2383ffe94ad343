//! Schema and field-definition storage boundary.
//!
//! Defines the tenant-scoped registry/catalog ports without storage
//! assumptions, plus an in-memory adapter for tests/dev and a Postgres
//! adapter for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemorySchemaStore;
pub use postgres::PostgresSchemaStore;
pub use r#trait::{FieldCatalog, SchemaRegistry};
