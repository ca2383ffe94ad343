//! Dynamic record storage boundary.
//!
//! A port trait plus an in-memory adapter (tests/dev) and a Postgres adapter
//! querying JSONB payloads by path.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use r#trait::DynamicRecordStore;
