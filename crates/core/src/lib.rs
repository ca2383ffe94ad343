//! `dynerp-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the shared error taxonomy, audit/soft-delete
//! stamps, paging types and the violation message catalog.

pub mod audit;
pub mod error;
pub mod id;
pub mod messages;
pub mod page;

pub use audit::AuditStamp;
pub use error::{DomainError, DomainResult, FieldViolation, ViolationCode};
pub use id::{FieldId, RecordId, SchemaId, TenantId, UserId};
pub use messages::MessageCatalog;
pub use page::{PageRequest, PagedResult};
