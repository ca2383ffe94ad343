//! Entity schemas: the declared shape of one dynamic entity type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dynerp_core::{AuditStamp, DomainError, DomainResult, SchemaId, TenantId, UserId};

use crate::field::{FieldDefinition, FieldSpec};

/// The declared shape of one dynamic entity type, versioned and tenant-scoped.
///
/// `(entity_type, tenant_id)` is unique among non-deleted schemas; the store
/// enforces that on insert. `version` starts at 1 and increments on every
/// field-set mutation (add/remove), never on activation changes. Schemas are
/// soft-deleted only; records may still reference them for audit retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub id: SchemaId,
    /// Logical name, e.g. "Customer". Machine key, case-sensitive.
    pub entity_type: String,
    pub display_name: String,
    pub description: Option<String>,
    pub tenant_id: TenantId,
    pub version: u32,
    pub is_active: bool,
    /// Owned field definitions, including soft-deleted ones.
    pub fields: Vec<FieldDefinition>,
    pub audit: AuditStamp,
}

impl EntitySchema {
    /// Define a new entity type for a tenant. Version starts at 1.
    pub fn new(
        tenant_id: TenantId,
        entity_type: impl Into<String>,
        display_name: impl Into<String>,
        description: Option<String>,
        fields: Vec<FieldSpec>,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<Self> {
        let entity_type = entity_type.into();
        let display_name = display_name.into();
        if entity_type.trim().is_empty() {
            return Err(DomainError::conflict("entity type cannot be empty"));
        }
        if display_name.trim().is_empty() {
            return Err(DomainError::conflict("display name cannot be empty"));
        }

        let id = SchemaId::new();
        let mut schema = Self {
            id,
            entity_type,
            display_name,
            description,
            tenant_id,
            version: 1,
            is_active: true,
            fields: Vec::with_capacity(fields.len()),
            audit: AuditStamp::created(at, by),
        };

        // Initial fields do not bump the version; they are part of version 1.
        for spec in fields {
            schema.insert_field(spec, at, by)?;
        }

        Ok(schema)
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted
    }

    /// Non-deleted fields, ordered by `order_index` with `display_name` as the
    /// deterministic tie-break.
    pub fn active_fields(&self) -> Vec<&FieldDefinition> {
        let mut fields: Vec<&FieldDefinition> =
            self.fields.iter().filter(|f| !f.is_deleted()).collect();
        fields.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        fields
    }

    /// Look up a non-deleted field by machine key (case-sensitive).
    pub fn field(&self, field_name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| !f.is_deleted() && f.field_name == field_name)
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.field(field_name).is_some()
    }

    pub fn searchable_fields(&self) -> Vec<&FieldDefinition> {
        self.active_fields()
            .into_iter()
            .filter(|f| f.is_searchable)
            .collect()
    }

    pub fn sortable_fields(&self) -> Vec<&FieldDefinition> {
        self.active_fields()
            .into_iter()
            .filter(|f| f.is_sortable)
            .collect()
    }

    /// Add a field. Duplicate name among non-deleted fields is a conflict.
    /// Bumps `version` on success.
    pub fn add_field(
        &mut self,
        spec: FieldSpec,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        self.insert_field(spec, at, by)?;
        self.version += 1;
        self.audit.touch(at, by);
        Ok(())
    }

    /// Soft-delete a field by name. Historical record payloads may still carry
    /// the key; the definition row is never physically removed. Bumps `version`.
    pub fn remove_field(
        &mut self,
        field_name: &str,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| !f.is_deleted() && f.field_name == field_name)
            .ok_or_else(|| DomainError::not_found(format!("field '{field_name}'")))?;
        field.audit.mark_deleted(at, by);
        self.version += 1;
        self.audit.touch(at, by);
        Ok(())
    }

    /// Deactivate without deleting. Records remain readable; new records are
    /// rejected by the engine while inactive.
    pub fn deactivate(&mut self, at: DateTime<Utc>, by: Option<UserId>) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::conflict(format!(
                "schema '{}' is already inactive",
                self.entity_type
            )));
        }
        self.is_active = false;
        self.audit.touch(at, by);
        Ok(())
    }

    pub fn reactivate(&mut self, at: DateTime<Utc>, by: Option<UserId>) -> DomainResult<()> {
        if self.is_active {
            return Err(DomainError::conflict(format!(
                "schema '{}' is already active",
                self.entity_type
            )));
        }
        self.is_active = true;
        self.audit.touch(at, by);
        Ok(())
    }

    /// Soft-delete the schema itself. Field definitions and records under it
    /// are left untouched (audit retention).
    pub fn soft_delete(&mut self, at: DateTime<Utc>, by: Option<UserId>) {
        self.audit.mark_deleted(at, by);
    }

    fn insert_field(
        &mut self,
        spec: FieldSpec,
        at: DateTime<Utc>,
        by: Option<UserId>,
    ) -> DomainResult<()> {
        if self.has_field(&spec.field_name) {
            return Err(DomainError::conflict(format!(
                "field '{}' already exists on schema '{}'",
                spec.field_name, self.entity_type
            )));
        }
        let field = FieldDefinition::from_spec(self.id, spec, at, by)?;
        self.fields.push(field);
        Ok(())
    }
}
