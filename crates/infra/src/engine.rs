//! Entity engine: the write/query pipeline over schemas and records.
//!
//! Every operation resolves the schema first, enforces tenant scoping and
//! activation state, runs validation where a payload is involved, and only
//! then touches the record store. Stores stay dumb; policy lives here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use dynerp_core::{
    DomainError, DomainResult, PageRequest, PagedResult, RecordId, SchemaId, TenantId, UserId,
};
use dynerp_records::{DateRange, DynamicRecord, SortDirection};
use dynerp_schema::{EntitySchema, FieldDefinition, FieldSpec, ValidationEngine};

use crate::record_store::DynamicRecordStore;
use crate::schema_store::{FieldCatalog, SchemaRegistry};

/// Caller input for defining a new entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDraft {
    pub entity_type: String,
    pub display_name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldSpec>,
}

pub struct DynamicEntityEngine<S, R> {
    schemas: S,
    records: R,
    validator: ValidationEngine,
}

impl<S, R> DynamicEntityEngine<S, R>
where
    S: SchemaRegistry + FieldCatalog,
    R: DynamicRecordStore,
{
    pub fn new(schemas: S, records: R) -> Self {
        Self {
            schemas,
            records,
            validator: ValidationEngine::default(),
        }
    }

    // ---- schema lifecycle ----

    /// Define a new entity type for a tenant.
    ///
    /// `(entity_type, tenant_id)` must be free among non-deleted schemas.
    pub async fn create_schema(
        &self,
        tenant_id: TenantId,
        draft: SchemaDraft,
        by: Option<UserId>,
    ) -> DomainResult<EntitySchema> {
        if self.schemas.exists(&draft.entity_type, tenant_id).await? {
            return Err(DomainError::conflict(format!(
                "entity type '{}' already defined for tenant",
                draft.entity_type
            )));
        }

        let schema = EntitySchema::new(
            tenant_id,
            draft.entity_type,
            draft.display_name,
            draft.description,
            draft.fields,
            Utc::now(),
            by,
        )?;
        self.schemas.insert(schema.clone()).await?;
        tracing::info!(
            schema_id = %schema.id,
            entity_type = %schema.entity_type,
            tenant_id = %tenant_id,
            field_count = schema.fields.len(),
            "schema created"
        );
        Ok(schema)
    }

    pub async fn get_schema(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> DomainResult<EntitySchema> {
        self.require_schema(tenant_id, schema_id).await
    }

    pub async fn get_schema_by_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> DomainResult<EntitySchema> {
        self.schemas
            .get_by_type_and_tenant(entity_type, tenant_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("schema '{entity_type}'")))
    }

    pub async fn list_schemas(&self, tenant_id: TenantId) -> DomainResult<Vec<EntitySchema>> {
        Ok(self.schemas.get_by_tenant(tenant_id).await?)
    }

    pub async fn list_active_schemas(
        &self,
        tenant_id: TenantId,
    ) -> DomainResult<Vec<EntitySchema>> {
        Ok(self.schemas.get_active(tenant_id).await?)
    }

    /// Add a field to an existing schema. Bumps the schema version; a
    /// concurrent mutation since the read fails with `Conflict`.
    pub async fn add_field(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        spec: FieldSpec,
        by: Option<UserId>,
    ) -> DomainResult<EntitySchema> {
        let mut schema = self.require_schema(tenant_id, schema_id).await?;
        let expected = schema.version;
        let field_name = spec.field_name.clone();
        schema.add_field(spec, Utc::now(), by)?;
        self.schemas.update(schema.clone(), expected).await?;
        tracing::info!(
            schema_id = %schema_id,
            field_name = %field_name,
            version = schema.version,
            "field added"
        );
        Ok(schema)
    }

    /// Soft-delete a field. Historical payloads keep the key.
    pub async fn remove_field(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        field_name: &str,
        by: Option<UserId>,
    ) -> DomainResult<EntitySchema> {
        let mut schema = self.require_schema(tenant_id, schema_id).await?;
        let expected = schema.version;
        schema.remove_field(field_name, Utc::now(), by)?;
        self.schemas.update(schema.clone(), expected).await?;
        tracing::info!(
            schema_id = %schema_id,
            field_name = %field_name,
            version = schema.version,
            "field removed"
        );
        Ok(schema)
    }

    pub async fn deactivate_schema(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        by: Option<UserId>,
    ) -> DomainResult<EntitySchema> {
        let mut schema = self.require_schema(tenant_id, schema_id).await?;
        let expected = schema.version;
        schema.deactivate(Utc::now(), by)?;
        self.schemas.update(schema.clone(), expected).await?;
        tracing::info!(schema_id = %schema_id, "schema deactivated");
        Ok(schema)
    }

    pub async fn reactivate_schema(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        by: Option<UserId>,
    ) -> DomainResult<EntitySchema> {
        let mut schema = self.require_schema(tenant_id, schema_id).await?;
        let expected = schema.version;
        schema.reactivate(Utc::now(), by)?;
        self.schemas.update(schema.clone(), expected).await?;
        tracing::info!(schema_id = %schema_id, "schema reactivated");
        Ok(schema)
    }

    /// Soft-delete a schema. Its records stay in place for audit retention and
    /// become unreachable through schema-scoped queries.
    pub async fn delete_schema(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        let mut schema = self.require_schema(tenant_id, schema_id).await?;
        let expected = schema.version;
        schema.soft_delete(Utc::now(), by);
        self.schemas.update(schema, expected).await?;
        tracing::info!(schema_id = %schema_id, tenant_id = %tenant_id, "schema deleted");
        Ok(())
    }

    // ---- field catalog ----

    /// Non-deleted fields of a schema in rendering order (`order_index`,
    /// display-name tie-break). Tenant-scoped through the registry.
    pub async fn list_fields(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> DomainResult<Vec<FieldDefinition>> {
        self.require_schema(tenant_id, schema_id).await?;
        Ok(self.schemas.fields_for_schema_ordered(schema_id).await?)
    }

    pub async fn fields_by_entity_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> DomainResult<Vec<FieldDefinition>> {
        Ok(self
            .schemas
            .fields_by_entity_type(entity_type, tenant_id)
            .await?)
    }

    // ---- record writes ----

    /// Create a record under a schema.
    ///
    /// Defaults are applied for absent fields, then the payload must validate
    /// with zero violations. The record is stamped with the schema version it
    /// validated against. Inactive schemas reject new records.
    pub async fn create_record(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        mut data: Map<String, JsonValue>,
        created_by: UserId,
    ) -> DomainResult<DynamicRecord> {
        let schema = self.require_schema(tenant_id, schema_id).await?;
        if schema.tenant_id != tenant_id {
            return Err(DomainError::tenant_mismatch(format!(
                "schema {schema_id} belongs to another tenant"
            )));
        }
        if !schema.is_active {
            return Err(DomainError::conflict(format!(
                "schema '{}' is inactive and accepts no new records",
                schema.entity_type
            )));
        }

        self.validator.apply_defaults(&schema, &mut data);
        let violations = self.validator.validate(&schema, &data);
        if !violations.is_empty() {
            return Err(DomainError::Validation(violations));
        }

        let record = DynamicRecord::new(
            schema_id,
            tenant_id,
            data,
            schema.version,
            created_by,
            Utc::now(),
        );
        self.records.insert(record.clone()).await?;
        tracing::info!(
            record_id = %record.id,
            schema_id = %schema_id,
            schema_version = schema.version,
            "record created"
        );
        Ok(record)
    }

    /// Replace a record's payload.
    ///
    /// `expected_row_version` is the row version the caller read; a stale
    /// write fails with `Conflict`. The payload is re-validated against the
    /// current schema version, which is then stamped onto the record.
    pub async fn update_record(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
        data: Map<String, JsonValue>,
        expected_row_version: u64,
        updated_by: UserId,
    ) -> DomainResult<DynamicRecord> {
        let mut record = self.require_record(tenant_id, record_id).await?;
        if record.row_version != expected_row_version {
            return Err(DomainError::conflict(format!(
                "record {record_id} changed since row version {expected_row_version} was read"
            )));
        }
        let schema = self.require_schema(tenant_id, record.schema_id).await?;

        let violations = self.validator.validate(&schema, &data);
        if !violations.is_empty() {
            return Err(DomainError::Validation(violations));
        }

        record.replace_data(data, schema.version, updated_by, Utc::now());
        self.records
            .update(record.clone(), expected_row_version)
            .await?;
        tracing::info!(
            record_id = %record_id,
            row_version = record.row_version,
            schema_version = schema.version,
            "record updated"
        );
        Ok(record)
    }

    /// Set a record's status string. No transition rules are enforced.
    pub async fn set_record_status(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
        status: &str,
        expected_row_version: u64,
        updated_by: UserId,
    ) -> DomainResult<DynamicRecord> {
        let mut record = self.require_record(tenant_id, record_id).await?;
        if record.row_version != expected_row_version {
            return Err(DomainError::conflict(format!(
                "record {record_id} changed since row version {expected_row_version} was read"
            )));
        }
        record.set_status(status, updated_by, Utc::now());
        self.records
            .update(record.clone(), expected_row_version)
            .await?;
        Ok(record)
    }

    /// Soft-delete a record. The payload is retained.
    pub async fn delete_record(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
        by: UserId,
    ) -> DomainResult<()> {
        let mut record = self.require_record(tenant_id, record_id).await?;
        let expected = record.row_version;
        record.soft_delete(by, Utc::now());
        self.records.update(record, expected).await?;
        tracing::info!(record_id = %record_id, "record deleted");
        Ok(())
    }

    // ---- record queries ----

    pub async fn get_record(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
    ) -> DomainResult<DynamicRecord> {
        self.require_record(tenant_id, record_id).await
    }

    pub async fn list_records(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> DomainResult<Vec<DynamicRecord>> {
        Ok(self
            .records
            .get_by_schema_and_tenant(schema_id, tenant_id)
            .await?)
    }

    pub async fn list_active_records(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> DomainResult<Vec<DynamicRecord>> {
        Ok(self
            .records
            .get_active_by_schema_and_tenant(schema_id, tenant_id)
            .await?)
    }

    pub async fn records_paged(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        page: PageRequest,
    ) -> DomainResult<PagedResult<DynamicRecord>> {
        Ok(self.records.get_paged(schema_id, tenant_id, page).await?)
    }

    /// Substring search over searchable fields.
    ///
    /// An empty field list means all of the schema's searchable fields. Naming
    /// a field that is not declared, or declared but not searchable, fails
    /// with `UnknownField`.
    pub async fn search_records(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        term: &str,
        fields: &[String],
    ) -> DomainResult<Vec<DynamicRecord>> {
        let schema = self.require_schema(tenant_id, schema_id).await?;

        let names: Vec<String> = if fields.is_empty() {
            self.schemas
                .searchable_fields(schema_id)
                .await?
                .into_iter()
                .map(|f| f.field_name)
                .collect()
        } else {
            for name in fields {
                match schema.field(name) {
                    Some(field) if field.is_searchable => {}
                    Some(_) => {
                        return Err(DomainError::unknown_field(format!(
                            "field '{name}' is not searchable"
                        )));
                    }
                    None => {
                        return Err(DomainError::unknown_field(format!(
                            "field '{name}' is not declared on schema '{}'",
                            schema.entity_type
                        )));
                    }
                }
            }
            fields.to_vec()
        };

        Ok(self
            .records
            .search(schema_id, tenant_id, term, &names)
            .await?)
    }

    /// Substring match against one declared field's value. The field need not
    /// be searchable, but it must exist on the schema.
    pub async fn find_by_field_value(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        field_name: &str,
        field_value: &str,
    ) -> DomainResult<Vec<DynamicRecord>> {
        self.require_schema(tenant_id, schema_id).await?;
        if !self.schemas.field_exists(schema_id, field_name).await? {
            return Err(DomainError::unknown_field(format!(
                "field '{field_name}' is not declared on schema {schema_id}"
            )));
        }
        Ok(self
            .records
            .get_by_field_value(schema_id, tenant_id, field_name, field_value)
            .await?)
    }

    pub async fn records_by_creator(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        user_id: UserId,
    ) -> DomainResult<Vec<DynamicRecord>> {
        Ok(self
            .records
            .get_by_creator(schema_id, tenant_id, user_id)
            .await?)
    }

    pub async fn records_in_range(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        range: DateRange,
    ) -> DomainResult<Vec<DynamicRecord>> {
        Ok(self
            .records
            .get_by_date_range(schema_id, tenant_id, range)
            .await?)
    }

    /// Records ordered by one sortable field's extracted value.
    pub async fn records_sorted(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        field_name: &str,
        direction: SortDirection,
    ) -> DomainResult<Vec<DynamicRecord>> {
        let schema = self.require_schema(tenant_id, schema_id).await?;
        match schema.field(field_name) {
            Some(field) if field.is_sortable => {}
            Some(_) => {
                return Err(DomainError::unknown_field(format!(
                    "field '{field_name}' is not sortable"
                )));
            }
            None => {
                return Err(DomainError::unknown_field(format!(
                    "field '{field_name}' is not declared on schema '{}'",
                    schema.entity_type
                )));
            }
        }
        Ok(self
            .records
            .get_sorted(schema_id, tenant_id, field_name, direction)
            .await?)
    }

    // ---- internals ----

    async fn require_schema(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> DomainResult<EntitySchema> {
        self.schemas
            .get(tenant_id, schema_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("schema {schema_id}")))
    }

    async fn require_record(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
    ) -> DomainResult<DynamicRecord> {
        self.records
            .get(tenant_id, record_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("record {record_id}")))
    }
}
