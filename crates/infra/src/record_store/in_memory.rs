//! In-memory record store.
//!
//! Intended for tests/dev. Matching and ordering semantics mirror the
//! Postgres adapter: substring match on the extracted text value of a JSON
//! field, newest-created-first listings.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use dynerp_core::{PageRequest, PagedResult, RecordId, SchemaId, TenantId, UserId};
use dynerp_records::{DateRange, DynamicRecord, SortDirection};

use super::r#trait::DynamicRecordStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordId, DynamicRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<RecordId, DynamicRecord>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::storage("record store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<RecordId, DynamicRecord>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::storage("record store lock poisoned"))
    }

    /// Non-deleted records in scope, newest first (id is the tie-break since
    /// UUIDv7 ids are time-ordered).
    fn scoped(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let records = self.read()?;
        let mut result: Vec<DynamicRecord> = records
            .values()
            .filter(|r| r.schema_id == schema_id && r.tenant_id == tenant_id && !r.is_deleted())
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            b.audit
                .created_at
                .cmp(&a.audit.created_at)
                .then_with(|| b.id.as_uuid().cmp(a.id.as_uuid()))
        });
        Ok(result)
    }
}

/// Extract a field value the way `data ->> field` would: bare string content
/// for strings, JSON rendering otherwise.
fn extracted_text(record: &DynamicRecord, field_name: &str) -> Option<String> {
    match record.field_value(field_name)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl DynamicRecordStore for InMemoryRecordStore {
    async fn insert(&self, record: DynamicRecord) -> Result<(), StoreError> {
        let mut records = self.write()?;
        if records.contains_key(&record.id) {
            return Err(StoreError::conflict(format!("record {} already exists", record.id)));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn update(
        &self,
        record: DynamicRecord,
        expected_row_version: u64,
    ) -> Result<(), StoreError> {
        let mut records = self.write()?;

        let stored = records
            .get(&record.id)
            .filter(|r| r.tenant_id == record.tenant_id)
            .ok_or_else(|| StoreError::not_found(format!("record {}", record.id)))?;

        if stored.row_version != expected_row_version {
            return Err(StoreError::conflict(format!(
                "record {} row version is {}, write expected {}",
                record.id, stored.row_version, expected_row_version
            )));
        }

        records.insert(record.id, record);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
    ) -> Result<Option<DynamicRecord>, StoreError> {
        let records = self.read()?;
        Ok(records
            .get(&record_id)
            .filter(|r| r.tenant_id == tenant_id && !r.is_deleted())
            .cloned())
    }

    async fn get_by_schema_and_tenant(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        self.scoped(schema_id, tenant_id)
    }

    async fn get_active_by_schema_and_tenant(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let mut records = self.scoped(schema_id, tenant_id)?;
        records.retain(DynamicRecord::is_active);
        Ok(records)
    }

    async fn get_paged(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        page: PageRequest,
    ) -> Result<PagedResult<DynamicRecord>, StoreError> {
        let all = self.scoped(schema_id, tenant_id)?;
        let total = all.len() as u64;
        let items: Vec<DynamicRecord> = all
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .collect();
        Ok(PagedResult::new(items, page, total))
    }

    async fn search(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        term: &str,
        fields: &[String],
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let mut records = self.scoped(schema_id, tenant_id)?;
        records.retain(|r| {
            fields.iter().any(|field| {
                extracted_text(r, field).is_some_and(|text| text.contains(term))
            })
        });
        Ok(records)
    }

    async fn get_by_field_value(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        field_name: &str,
        field_value: &str,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let mut records = self.scoped(schema_id, tenant_id)?;
        records.retain(|r| {
            extracted_text(r, field_name).is_some_and(|text| text.contains(field_value))
        });
        Ok(records)
    }

    async fn get_by_creator(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let mut records = self.scoped(schema_id, tenant_id)?;
        records.retain(|r| r.created_by == user_id);
        Ok(records)
    }

    async fn get_by_date_range(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        range: DateRange,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let mut records = self.scoped(schema_id, tenant_id)?;
        records.retain(|r| range.contains(r.audit.created_at));
        Ok(records)
    }

    async fn get_sorted(
        &self,
        schema_id: SchemaId,
        tenant_id: TenantId,
        field_name: &str,
        direction: SortDirection,
    ) -> Result<Vec<DynamicRecord>, StoreError> {
        let mut records = self.scoped(schema_id, tenant_id)?;
        // Records without the field sort last in both directions, like SQL
        // NULLS LAST.
        records.sort_by(|a, b| {
            let a_val = extracted_text(a, field_name);
            let b_val = extracted_text(b, field_name);
            match (a_val, b_val) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(a_val), Some(b_val)) => match direction {
                    SortDirection::Ascending => a_val.cmp(&b_val),
                    SortDirection::Descending => b_val.cmp(&a_val),
                },
            }
        });
        Ok(records)
    }
}
