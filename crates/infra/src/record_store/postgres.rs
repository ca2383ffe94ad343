//! Postgres-backed record store.
//!
//! Records live in `dynamic_records` with the payload in a JSONB `data`
//! column. Field-targeted queries extract text with `data ->> $n`; the field
//! name and the matched value are both bound parameters, never interpolated.
//! Sort direction is the only piece of SQL assembled from caller input, and
//! it is rendered from an enum, not a string.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use dynerp_core::{AuditStamp, PageRequest, PagedResult, RecordId, SchemaId, TenantId, UserId};
use dynerp_records::{DateRange, DynamicRecord, SortDirection};

use super::r#trait::DynamicRecordStore;
use crate::error::StoreError;

const SELECT_RECORDS: &str = "\
    SELECT id, schema_id, tenant_id, data, status, schema_version, row_version, \
           created_at, created_by, updated_at, updated_by, is_deleted, deleted_at, deleted_by \
    FROM dynamic_records";

const SCOPE: &str = "schema_id = $1 AND tenant_id = $2 AND is_deleted = FALSE";
const NEWEST_FIRST: &str = "ORDER BY created_at DESC, id DESC";

pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_scoped(
        &self,
        extra_where: &str,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<PgRow>, StoreError> {
        let sql = format!("{SELECT_RECORDS} WHERE {SCOPE}{extra_where} {NEWEST_FIRST}");
        Ok(sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl DynamicRecordStore for PostgresRecordStore {
    async fn insert(&self, record: DynamicRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO dynamic_records ( \
                id, schema_id, tenant_id, data, status, schema_version, row_version, \
                created_at, created_by, updated_at, updated_by, is_deleted, deleted_at, deleted_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(record.id.as_uuid())
        .bind(record.schema_id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(JsonValue::Object(record.data.clone()))
        .bind(&record.status)
        .bind(record.schema_version as i32)
        .bind(record.row_version as i64)
        .bind(record.audit.created_at)
        .bind(record.created_by.as_uuid())
        .bind(record.audit.updated_at)
        .bind(record.updated_by.map(|u| *u.as_uuid()))
        .bind(record.audit.is_deleted)
        .bind(record.audit.deleted_at)
        .bind(record.audit.deleted_by.map(|u| *u.as_uuid()))
        .execute(&self.pool)
        .await?;
        tracing::debug!(record_id = %record.id, schema_id = %record.schema_id, "record inserted");
        Ok(())
    }

    async fn update(
        &self,
        record: DynamicRecord,
        expected_row_version: u64,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE dynamic_records SET \
                data = $1, status = $2, schema_version = $3, row_version = $4, \
                updated_at = $5, updated_by = $6, is_deleted = $7, deleted_at = $8, deleted_by = $9 \
             WHERE id = $10 AND tenant_id = $11 AND row_version = $12 AND is_deleted = FALSE",
        )
        .bind(JsonValue::Object(record.data.clone()))
        .bind(&record.status)
        .bind(record.schema_version as i32)
        .bind(record.row_version as i64)
        .bind(record.audit.updated_at)
        .bind(record.updated_by.map(|u| *u.as_uuid()))
        .bind(record.audit.is_deleted)
        .bind(record.audit.deleted_at)
        .bind(record.audit.deleted_by.map(|u| *u.as_uuid()))
        .bind(record.id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(expected_row_version as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: bool = sqlx::query(
                "SELECT EXISTS( \
                    SELECT 1 FROM dynamic_records \
                    WHERE id = $1 AND tenant_id = $2 AND is_deleted = FALSE)",
            )
            .bind(record.id.as_uuid())
            .bind(record.tenant_id.as_uuid())
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
            return if exists {
                Err(StoreError::conflict(format!(
                    "record {} changed since row version {expected_row_version} was read",
                    record.id
                )))
            } else {
                Err(StoreError::not_found(format!("record {}", record.id)))
            };
        }
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
    ) -> Result<Option<DynamicRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "{SELECT_RECORDS} WHERE id = $1 AND tenant_id = $2 AND is_deleted = FALSE"
        ))
        .bind(record_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn get_by_schema_and_tenant(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let rows = self.fetch_scoped("", schema_id, tenant_id).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_active_by_schema_and_tenant(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let sql = format!("{SELECT_RECORDS} WHERE {SCOPE} AND status = $3 {NEWEST_FIRST}");
        let rows = sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(dynerp_records::RECORD_STATUS_ACTIVE)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_paged(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        page: PageRequest,
    ) -> Result<PagedResult<DynamicRecord>, StoreError> {
        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) FROM dynamic_records WHERE {SCOPE}"
        ))
        .bind(schema_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_one(&self.pool)
        .await?
        .try_get(0)?;

        let sql = format!("{SELECT_RECORDS} WHERE {SCOPE} {NEWEST_FIRST} LIMIT $3 OFFSET $4");
        let rows = sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(page.page_size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PagedResult::new(items, page, total as u64))
    }

    async fn search(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        term: &str,
        fields: &[String],
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!("{SELECT_RECORDS} WHERE {SCOPE} AND (");
        for (i, _) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(" OR ");
            }
            sql.push_str(&format!("data ->> ${} LIKE $3", i + 4));
        }
        sql.push_str(&format!(") {NEWEST_FIRST}"));

        let mut query = sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(format!("%{term}%"));
        for field in fields {
            query = query.bind(field);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_by_field_value(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        field_name: &str,
        field_value: &str,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let sql = format!("{SELECT_RECORDS} WHERE {SCOPE} AND data ->> $3 LIKE $4 {NEWEST_FIRST}");
        let rows = sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(field_name)
            .bind(format!("%{field_value}%"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_by_creator(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let sql = format!("{SELECT_RECORDS} WHERE {SCOPE} AND created_by = $3 {NEWEST_FIRST}");
        let rows = sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_by_date_range(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        range: DateRange,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let sql = format!(
            "{SELECT_RECORDS} WHERE {SCOPE} \
             AND created_at >= $3 AND created_at <= $4 {NEWEST_FIRST}"
        );
        let rows = sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_sorted(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        field_name: &str,
        direction: SortDirection,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let keyword = match direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let sql = format!(
            "{SELECT_RECORDS} WHERE {SCOPE} \
             ORDER BY data ->> $3 {keyword} NULLS LAST, created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(schema_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(field_name)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &PgRow) -> Result<DynamicRecord, StoreError> {
    let data: JsonValue = row.try_get("data")?;
    let data: Map<String, JsonValue> = match data {
        JsonValue::Object(map) => map,
        other => {
            return Err(StoreError::storage(format!(
                "record payload is not a JSON object: {other}"
            )));
        }
    };
    let created_by = UserId::from_uuid(row.try_get("created_by")?);
    let updated_by = row
        .try_get::<Option<Uuid>, _>("updated_by")?
        .map(UserId::from_uuid);
    let deleted_by = row
        .try_get::<Option<Uuid>, _>("deleted_by")?
        .map(UserId::from_uuid);

    Ok(DynamicRecord {
        id: RecordId::from_uuid(row.try_get("id")?),
        schema_id: SchemaId::from_uuid(row.try_get("schema_id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        data,
        status: row.try_get("status")?,
        schema_version: row.try_get::<i32, _>("schema_version")? as u32,
        row_version: row.try_get::<i64, _>("row_version")? as u64,
        created_by,
        updated_by,
        audit: AuditStamp {
            created_at: row.try_get("created_at")?,
            created_by: Some(created_by),
            updated_at: row.try_get("updated_at")?,
            updated_by,
            is_deleted: row.try_get("is_deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            deleted_by,
        },
    })
}
