//! Infrastructure layer: storage ports, adapters and the entity engine.
//!
//! Each store boundary ships as a port trait plus an in-memory adapter
//! (tests/dev) and a Postgres adapter (production). The `engine` module wires
//! the schema registry, field catalog, validation engine and record store
//! into the write/query pipeline.

pub mod config;
pub mod engine;
pub mod error;
pub mod record_store;
pub mod schema_store;

pub use config::PgStoreConfig;
pub use engine::{DynamicEntityEngine, SchemaDraft};
pub use error::StoreError;
pub use record_store::{DynamicRecordStore, InMemoryRecordStore, PostgresRecordStore};
pub use schema_store::{FieldCatalog, InMemorySchemaStore, PostgresSchemaStore, SchemaRegistry};

#[cfg(test)]
mod integration_tests;
