//! Dynamic records domain module.
//!
//! One `DynamicRecord` is a data row conforming to an entity schema: a JSON
//! payload plus status, audit, tenant binding and concurrency stamps. Pure
//! domain logic (no IO, no storage).

pub mod query;
pub mod record;

pub use query::{DateRange, SortDirection};
pub use record::{DynamicRecord, RECORD_STATUS_ACTIVE};
