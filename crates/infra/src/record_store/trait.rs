//! Dynamic record storage port.

use async_trait::async_trait;

use dynerp_core::{PageRequest, PagedResult, RecordId, SchemaId, TenantId, UserId};
use dynerp_records::{DateRange, DynamicRecord, SortDirection};

use crate::error::StoreError;

/// Schema+tenant-scoped storage of dynamic records.
///
/// Every query filters on both `schema_id` and `tenant_id`; soft-deleted rows
/// are invisible; list results come back newest-created-first. Field names
/// reaching `search`/`get_by_field_value`/`get_sorted` must already be
/// restricted to the schema's catalog by the caller (the engine enforces
/// this); the store binds them as parameters, never splices them into query
/// text as trusted SQL.
#[async_trait]
pub trait DynamicRecordStore: Send + Sync {
    async fn insert(&self, record: DynamicRecord) -> Result<(), StoreError>;

    /// Persist a mutated record. `expected_row_version` is the row version the
    /// caller read; a stale write fails with `Conflict`.
    async fn update(
        &self,
        record: DynamicRecord,
        expected_row_version: u64,
    ) -> Result<(), StoreError>;

    async fn get(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
    ) -> Result<Option<DynamicRecord>, StoreError>;

    /// All non-deleted records under a schema, newest first.
    async fn get_by_schema_and_tenant(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<DynamicRecord>, StoreError>;

    /// The `Status == "Active"` subset.
    async fn get_active_by_schema_and_tenant(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<DynamicRecord>, StoreError>;

    /// One 1-based page; the result's total count reflects the full filtered
    /// set before paging.
    async fn get_paged(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        page: PageRequest,
    ) -> Result<PagedResult<DynamicRecord>, StoreError>;

    /// OR-combined substring match of `term` against each named field's
    /// extracted JSON value.
    async fn search(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        term: &str,
        fields: &[String],
    ) -> Result<Vec<DynamicRecord>, StoreError>;

    /// Substring match against a single field's extracted JSON value.
    async fn get_by_field_value(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        field_name: &str,
        field_value: &str,
    ) -> Result<Vec<DynamicRecord>, StoreError>;

    async fn get_by_creator(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<DynamicRecord>, StoreError>;

    /// Inclusive bounds on `created_at`.
    async fn get_by_date_range(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        range: DateRange,
    ) -> Result<Vec<DynamicRecord>, StoreError>;

    /// Records ordered by one field's extracted JSON value (text comparison,
    /// matching the storage layer's path extraction).
    async fn get_sorted(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        field_name: &str,
        direction: SortDirection,
    ) -> Result<Vec<DynamicRecord>, StoreError>;
}
