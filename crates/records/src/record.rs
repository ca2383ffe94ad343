//! Dynamic record rows: schema-scoped JSON payloads plus metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use dynerp_core::{AuditStamp, RecordId, SchemaId, TenantId, UserId};

/// The status value recognized by active-subset queries. Status is otherwise
/// free-form; transition policy is a caller concern.
pub const RECORD_STATUS_ACTIVE: &str = "Active";

/// One data row conforming to an entity schema.
///
/// `data` keys are a subset of the schema's declared field names; the payload
/// is only ever persisted after a validation pass with zero violations.
/// `tenant_id` always equals the owning schema's tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRecord {
    pub id: RecordId,
    pub schema_id: SchemaId,
    pub tenant_id: TenantId,
    pub data: Map<String, JsonValue>,
    pub status: String,
    /// Schema version the payload was validated against.
    pub schema_version: u32,
    /// Monotonic row version for optimistic concurrency. Starts at 1,
    /// incremented on every committed update; stale writers are rejected.
    pub row_version: u64,
    pub created_by: UserId,
    pub updated_by: Option<UserId>,
    pub audit: AuditStamp,
}

impl DynamicRecord {
    pub fn new(
        schema_id: SchemaId,
        tenant_id: TenantId,
        data: Map<String, JsonValue>,
        schema_version: u32,
        created_by: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            schema_id,
            tenant_id,
            data,
            status: RECORD_STATUS_ACTIVE.to_string(),
            schema_version,
            row_version: 1,
            created_by,
            updated_by: Some(created_by),
            audit: AuditStamp::created(at, Some(created_by)),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted() && self.status == RECORD_STATUS_ACTIVE
    }

    /// Replace the payload after re-validation. Bumps `row_version` and stamps
    /// the schema version the new payload was validated against.
    pub fn replace_data(
        &mut self,
        data: Map<String, JsonValue>,
        schema_version: u32,
        updated_by: UserId,
        at: DateTime<Utc>,
    ) {
        self.data = data;
        self.schema_version = schema_version;
        self.row_version += 1;
        self.updated_by = Some(updated_by);
        self.audit.touch(at, Some(updated_by));
    }

    /// Set a new status. No transition rules at this layer.
    pub fn set_status(&mut self, status: impl Into<String>, updated_by: UserId, at: DateTime<Utc>) {
        self.status = status.into();
        self.row_version += 1;
        self.updated_by = Some(updated_by);
        self.audit.touch(at, Some(updated_by));
    }

    pub fn soft_delete(&mut self, by: UserId, at: DateTime<Utc>) {
        self.audit.mark_deleted(at, Some(by));
    }

    /// The extracted value of one payload field, if present.
    pub fn field_value(&self, field_name: &str) -> Option<&JsonValue> {
        self.data.get(field_name)
    }
}
