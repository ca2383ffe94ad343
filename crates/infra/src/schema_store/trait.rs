//! Schema registry and field catalog ports.

use async_trait::async_trait;

use dynerp_core::{SchemaId, TenantId};
use dynerp_schema::{EntitySchema, FieldDefinition};

use crate::error::StoreError;

/// Tenant-scoped registry of entity schema definitions.
///
/// Every read filters on the caller's tenant id; a schema id alone is never
/// trusted, so cross-tenant lookups come back empty rather than leaking rows.
/// Soft-deleted schemas are invisible to all reads.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Persist a newly defined schema together with its field definitions.
    ///
    /// Fails with `Conflict` when `(entity_type, tenant_id)` already exists
    /// among non-deleted schemas.
    async fn insert(&self, schema: EntitySchema) -> Result<(), StoreError>;

    /// Persist a mutated schema (field-set changes, activation, soft delete).
    ///
    /// `expected_version` is the schema version the caller read before
    /// mutating; a stale write fails with `Conflict`.
    async fn update(&self, schema: EntitySchema, expected_version: u32) -> Result<(), StoreError>;

    /// Fetch one non-deleted schema, tenant-scoped.
    async fn get(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> Result<Option<EntitySchema>, StoreError>;

    /// All non-deleted schemas of a tenant, ordered by display name, fields
    /// included.
    async fn get_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<EntitySchema>, StoreError>;

    /// At most one non-deleted schema per `(entity_type, tenant_id)`; fields
    /// come back ordered by `order_index`.
    async fn get_by_type_and_tenant(
        &self,
        entity_type: &str,
        tenant_id: TenantId,
    ) -> Result<Option<EntitySchema>, StoreError>;

    async fn exists(&self, entity_type: &str, tenant_id: TenantId) -> Result<bool, StoreError>;

    /// Active (and non-deleted) schemas of a tenant; each schema's field
    /// collection is filtered to non-deleted fields only.
    async fn get_active(&self, tenant_id: TenantId) -> Result<Vec<EntitySchema>, StoreError>;
}

/// Read-side catalog of field definitions, keyed by schema.
///
/// Field names are case-sensitive machine keys; display names are
/// presentation-only and never used for lookups.
#[async_trait]
pub trait FieldCatalog: Send + Sync {
    /// Non-deleted fields of a schema, ordered by `order_index`.
    async fn fields_for_schema(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError>;

    /// Same as `fields_for_schema` with `display_name` as a secondary sort,
    /// for deterministic rendering when order indexes tie.
    async fn fields_for_schema_ordered(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError>;

    async fn field_exists(
        &self,
        schema_id: SchemaId,
        field_name: &str,
    ) -> Result<bool, StoreError>;

    /// Fields resolved through the schema's `(entity_type, tenant_id)` key;
    /// both schema and field soft-delete flags filter the result.
    async fn fields_by_entity_type(
        &self,
        entity_type: &str,
        tenant_id: TenantId,
    ) -> Result<Vec<FieldDefinition>, StoreError>;

    async fn searchable_fields(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError>;

    async fn sortable_fields(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError>;
}
