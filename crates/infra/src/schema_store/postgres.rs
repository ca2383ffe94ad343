//! Postgres-backed schema store.
//!
//! Persists schemas in `entity_schemas` and their field definitions in
//! `field_definitions` (owned rows, one per field, soft-delete columns on
//! both). Every query binds its parameters; tenant id appears in every WHERE
//! clause so cross-tenant reads are impossible at the SQL level.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use dynerp_core::{AuditStamp, FieldId, SchemaId, TenantId, UserId};
use dynerp_schema::{DataType, EntitySchema, FieldDefinition, FieldType};

use super::r#trait::{FieldCatalog, SchemaRegistry};
use crate::error::StoreError;

const SELECT_SCHEMAS: &str = "\
    SELECT id, tenant_id, entity_type, display_name, description, version, is_active, \
           created_at, created_by, updated_at, updated_by, is_deleted, deleted_at, deleted_by \
    FROM entity_schemas";

const SELECT_FIELDS: &str = "\
    SELECT id, schema_id, field_name, display_name, field_type, data_type, \
           is_required, is_searchable, is_sortable, default_value, \
           max_length, min_length, max_value, min_value, options, validation_rules, order_index, \
           created_at, created_by, updated_at, updated_by, is_deleted, deleted_at, deleted_by \
    FROM field_definitions";

pub struct PostgresSchemaStore {
    pool: PgPool,
}

impl PostgresSchemaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_fields(
        &self,
        schema_ids: &[Uuid],
        live_only: bool,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let mut sql = format!("{SELECT_FIELDS} WHERE schema_id = ANY($1)");
        if live_only {
            sql.push_str(" AND is_deleted = FALSE");
        }
        sql.push_str(" ORDER BY order_index, display_name");

        let rows = sqlx::query(&sql)
            .bind(schema_ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(field_from_row).collect()
    }

    async fn attach_fields(
        &self,
        rows: Vec<PgRow>,
        live_fields_only: bool,
    ) -> Result<Vec<EntitySchema>, StoreError> {
        let mut schemas: Vec<EntitySchema> =
            rows.iter().map(schema_from_row).collect::<Result<_, _>>()?;
        if schemas.is_empty() {
            return Ok(schemas);
        }

        let ids: Vec<Uuid> = schemas.iter().map(|s| *s.id.as_uuid()).collect();
        let fields = self.load_fields(&ids, live_fields_only).await?;
        for field in fields {
            if let Some(schema) = schemas.iter_mut().find(|s| s.id == field.schema_id) {
                schema.fields.push(field);
            }
        }
        Ok(schemas)
    }
}

#[async_trait]
impl SchemaRegistry for PostgresSchemaStore {
    async fn insert(&self, schema: EntitySchema) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let duplicate: bool = sqlx::query(
            "SELECT EXISTS( \
                SELECT 1 FROM entity_schemas \
                WHERE entity_type = $1 AND tenant_id = $2 AND is_deleted = FALSE)",
        )
        .bind(&schema.entity_type)
        .bind(schema.tenant_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?
        .try_get(0)?;
        if duplicate {
            return Err(StoreError::conflict(format!(
                "entity type '{}' already defined for tenant",
                schema.entity_type
            )));
        }

        sqlx::query(
            "INSERT INTO entity_schemas ( \
                id, tenant_id, entity_type, display_name, description, version, is_active, \
                created_at, created_by, updated_at, updated_by, is_deleted, deleted_at, deleted_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(schema.id.as_uuid())
        .bind(schema.tenant_id.as_uuid())
        .bind(&schema.entity_type)
        .bind(&schema.display_name)
        .bind(&schema.description)
        .bind(schema.version as i32)
        .bind(schema.is_active)
        .bind(schema.audit.created_at)
        .bind(schema.audit.created_by.map(|u| *u.as_uuid()))
        .bind(schema.audit.updated_at)
        .bind(schema.audit.updated_by.map(|u| *u.as_uuid()))
        .bind(schema.audit.is_deleted)
        .bind(schema.audit.deleted_at)
        .bind(schema.audit.deleted_by.map(|u| *u.as_uuid()))
        .execute(&mut *tx)
        .await?;

        for field in &schema.fields {
            upsert_field(&mut tx, field).await?;
        }

        tx.commit().await?;
        tracing::debug!(schema_id = %schema.id, entity_type = %schema.entity_type, "schema inserted");
        Ok(())
    }

    async fn update(&self, schema: EntitySchema, expected_version: u32) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE entity_schemas SET \
                display_name = $1, description = $2, version = $3, is_active = $4, \
                updated_at = $5, updated_by = $6, is_deleted = $7, deleted_at = $8, deleted_by = $9 \
             WHERE id = $10 AND tenant_id = $11 AND version = $12 AND is_deleted = FALSE",
        )
        .bind(&schema.display_name)
        .bind(&schema.description)
        .bind(schema.version as i32)
        .bind(schema.is_active)
        .bind(schema.audit.updated_at)
        .bind(schema.audit.updated_by.map(|u| *u.as_uuid()))
        .bind(schema.audit.is_deleted)
        .bind(schema.audit.deleted_at)
        .bind(schema.audit.deleted_by.map(|u| *u.as_uuid()))
        .bind(schema.id.as_uuid())
        .bind(schema.tenant_id.as_uuid())
        .bind(expected_version as i32)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: bool = sqlx::query(
                "SELECT EXISTS( \
                    SELECT 1 FROM entity_schemas \
                    WHERE id = $1 AND tenant_id = $2 AND is_deleted = FALSE)",
            )
            .bind(schema.id.as_uuid())
            .bind(schema.tenant_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?
            .try_get(0)?;
            return if exists {
                Err(StoreError::conflict(format!(
                    "schema {} changed since version {expected_version} was read",
                    schema.id
                )))
            } else {
                Err(StoreError::not_found(format!("schema {}", schema.id)))
            };
        }

        for field in &schema.fields {
            upsert_field(&mut tx, field).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> Result<Option<EntitySchema>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_SCHEMAS} WHERE id = $1 AND tenant_id = $2 AND is_deleted = FALSE"
        ))
        .bind(schema_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(self.attach_fields(rows, false).await?.into_iter().next())
    }

    async fn get_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<EntitySchema>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_SCHEMAS} WHERE tenant_id = $1 AND is_deleted = FALSE ORDER BY display_name"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        self.attach_fields(rows, false).await
    }

    async fn get_by_type_and_tenant(
        &self,
        entity_type: &str,
        tenant_id: TenantId,
    ) -> Result<Option<EntitySchema>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_SCHEMAS} WHERE entity_type = $1 AND tenant_id = $2 AND is_deleted = FALSE"
        ))
        .bind(entity_type)
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(self.attach_fields(rows, false).await?.into_iter().next())
    }

    async fn exists(&self, entity_type: &str, tenant_id: TenantId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query(
            "SELECT EXISTS( \
                SELECT 1 FROM entity_schemas \
                WHERE entity_type = $1 AND tenant_id = $2 AND is_deleted = FALSE)",
        )
        .bind(entity_type)
        .bind(tenant_id.as_uuid())
        .fetch_one(&self.pool)
        .await?
        .try_get(0)?;
        Ok(exists)
    }

    async fn get_active(&self, tenant_id: TenantId) -> Result<Vec<EntitySchema>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_SCHEMAS} \
             WHERE tenant_id = $1 AND is_active = TRUE AND is_deleted = FALSE \
             ORDER BY display_name"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        self.attach_fields(rows, true).await
    }
}

#[async_trait]
impl FieldCatalog for PostgresSchemaStore {
    async fn fields_for_schema(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_FIELDS} WHERE schema_id = $1 AND is_deleted = FALSE ORDER BY order_index"
        ))
        .bind(schema_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(field_from_row).collect()
    }

    async fn fields_for_schema_ordered(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_FIELDS} WHERE schema_id = $1 AND is_deleted = FALSE \
             ORDER BY order_index, display_name"
        ))
        .bind(schema_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(field_from_row).collect()
    }

    async fn field_exists(
        &self,
        schema_id: SchemaId,
        field_name: &str,
    ) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query(
            "SELECT EXISTS( \
                SELECT 1 FROM field_definitions \
                WHERE schema_id = $1 AND field_name = $2 AND is_deleted = FALSE)",
        )
        .bind(schema_id.as_uuid())
        .bind(field_name)
        .fetch_one(&self.pool)
        .await?
        .try_get(0)?;
        Ok(exists)
    }

    async fn fields_by_entity_type(
        &self,
        entity_type: &str,
        tenant_id: TenantId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let rows = sqlx::query(
            "SELECT f.id, f.schema_id, f.field_name, f.display_name, f.field_type, f.data_type, \
                    f.is_required, f.is_searchable, f.is_sortable, f.default_value, \
                    f.max_length, f.min_length, f.max_value, f.min_value, \
                    f.options, f.validation_rules, f.order_index, \
                    f.created_at, f.created_by, f.updated_at, f.updated_by, \
                    f.is_deleted, f.deleted_at, f.deleted_by \
             FROM field_definitions f \
             JOIN entity_schemas s ON s.id = f.schema_id \
             WHERE s.entity_type = $1 AND s.tenant_id = $2 \
               AND f.is_deleted = FALSE AND s.is_deleted = FALSE \
             ORDER BY f.order_index, f.display_name",
        )
        .bind(entity_type)
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(field_from_row).collect()
    }

    async fn searchable_fields(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_FIELDS} \
             WHERE schema_id = $1 AND is_searchable = TRUE AND is_deleted = FALSE \
             ORDER BY order_index"
        ))
        .bind(schema_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(field_from_row).collect()
    }

    async fn sortable_fields(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_FIELDS} \
             WHERE schema_id = $1 AND is_sortable = TRUE AND is_deleted = FALSE \
             ORDER BY order_index"
        ))
        .bind(schema_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(field_from_row).collect()
    }
}

async fn upsert_field(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    field: &FieldDefinition,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO field_definitions ( \
            id, schema_id, field_name, display_name, field_type, data_type, \
            is_required, is_searchable, is_sortable, default_value, \
            max_length, min_length, max_value, min_value, options, validation_rules, order_index, \
            created_at, created_by, updated_at, updated_by, is_deleted, deleted_at, deleted_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                 $18, $19, $20, $21, $22, $23, $24) \
         ON CONFLICT (id) DO UPDATE SET \
            display_name = EXCLUDED.display_name, \
            field_type = EXCLUDED.field_type, \
            data_type = EXCLUDED.data_type, \
            is_required = EXCLUDED.is_required, \
            is_searchable = EXCLUDED.is_searchable, \
            is_sortable = EXCLUDED.is_sortable, \
            default_value = EXCLUDED.default_value, \
            max_length = EXCLUDED.max_length, \
            min_length = EXCLUDED.min_length, \
            max_value = EXCLUDED.max_value, \
            min_value = EXCLUDED.min_value, \
            options = EXCLUDED.options, \
            validation_rules = EXCLUDED.validation_rules, \
            order_index = EXCLUDED.order_index, \
            updated_at = EXCLUDED.updated_at, \
            updated_by = EXCLUDED.updated_by, \
            is_deleted = EXCLUDED.is_deleted, \
            deleted_at = EXCLUDED.deleted_at, \
            deleted_by = EXCLUDED.deleted_by",
    )
    .bind(field.id.as_uuid())
    .bind(field.schema_id.as_uuid())
    .bind(&field.field_name)
    .bind(&field.display_name)
    .bind(field.field_type.as_str())
    .bind(field.data_type.as_str())
    .bind(field.is_required)
    .bind(field.is_searchable)
    .bind(field.is_sortable)
    .bind(&field.default_value)
    .bind(field.max_length.map(|v| v as i32))
    .bind(field.min_length.map(|v| v as i32))
    .bind(field.max_value)
    .bind(field.min_value)
    .bind(field.options.as_ref().map(|o| JsonValue::Array(o.clone())))
    .bind(&field.validation_rules)
    .bind(field.order_index)
    .bind(field.audit.created_at)
    .bind(field.audit.created_by.map(|u| *u.as_uuid()))
    .bind(field.audit.updated_at)
    .bind(field.audit.updated_by.map(|u| *u.as_uuid()))
    .bind(field.audit.is_deleted)
    .bind(field.audit.deleted_at)
    .bind(field.audit.deleted_by.map(|u| *u.as_uuid()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn audit_from_row(row: &PgRow) -> Result<AuditStamp, StoreError> {
    Ok(AuditStamp {
        created_at: row.try_get("created_at")?,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")?
            .map(UserId::from_uuid),
        updated_at: row.try_get("updated_at")?,
        updated_by: row
            .try_get::<Option<Uuid>, _>("updated_by")?
            .map(UserId::from_uuid),
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
        deleted_by: row
            .try_get::<Option<Uuid>, _>("deleted_by")?
            .map(UserId::from_uuid),
    })
}

fn schema_from_row(row: &PgRow) -> Result<EntitySchema, StoreError> {
    Ok(EntitySchema {
        id: SchemaId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        entity_type: row.try_get("entity_type")?,
        display_name: row.try_get("display_name")?,
        description: row.try_get("description")?,
        version: row.try_get::<i32, _>("version")? as u32,
        is_active: row.try_get("is_active")?,
        fields: Vec::new(),
        audit: audit_from_row(row)?,
    })
}

fn field_from_row(row: &PgRow) -> Result<FieldDefinition, StoreError> {
    let field_type: String = row.try_get("field_type")?;
    let data_type: String = row.try_get("data_type")?;
    Ok(FieldDefinition {
        id: FieldId::from_uuid(row.try_get("id")?),
        schema_id: SchemaId::from_uuid(row.try_get("schema_id")?),
        field_name: row.try_get("field_name")?,
        display_name: row.try_get("display_name")?,
        field_type: FieldType::from_str(&field_type)
            .map_err(|e| StoreError::storage(e.to_string()))?,
        data_type: DataType::from_str(&data_type)
            .map_err(|e| StoreError::storage(e.to_string()))?,
        is_required: row.try_get("is_required")?,
        is_searchable: row.try_get("is_searchable")?,
        is_sortable: row.try_get("is_sortable")?,
        default_value: row.try_get("default_value")?,
        max_length: row.try_get::<Option<i32>, _>("max_length")?.map(|v| v as u32),
        min_length: row.try_get::<Option<i32>, _>("min_length")?.map(|v| v as u32),
        max_value: row.try_get("max_value")?,
        min_value: row.try_get("min_value")?,
        options: row
            .try_get::<Option<JsonValue>, _>("options")?
            .and_then(|v| v.as_array().cloned()),
        validation_rules: row.try_get("validation_rules")?,
        order_index: row.try_get("order_index")?,
        audit: audit_from_row(row)?,
    })
}
