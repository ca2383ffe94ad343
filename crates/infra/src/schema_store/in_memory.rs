//! In-memory schema store.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use dynerp_core::{SchemaId, TenantId};
use dynerp_schema::{EntitySchema, FieldDefinition};

use super::r#trait::{FieldCatalog, SchemaRegistry};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct InMemorySchemaStore {
    schemas: RwLock<HashMap<SchemaId, EntitySchema>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<SchemaId, EntitySchema>>, StoreError> {
        self.schemas
            .read()
            .map_err(|_| StoreError::storage("schema store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<SchemaId, EntitySchema>>, StoreError> {
        self.schemas
            .write()
            .map_err(|_| StoreError::storage("schema store lock poisoned"))
    }

    /// Clone with fields ordered by `order_index` (display-name tie-break).
    fn with_ordered_fields(schema: &EntitySchema) -> EntitySchema {
        let mut schema = schema.clone();
        schema.fields.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        schema
    }

    fn live_fields(schema: &EntitySchema) -> Vec<FieldDefinition> {
        let mut fields: Vec<FieldDefinition> = schema
            .fields
            .iter()
            .filter(|f| !f.is_deleted())
            .cloned()
            .collect();
        fields.sort_by_key(|f| f.order_index);
        fields
    }
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaStore {
    async fn insert(&self, schema: EntitySchema) -> Result<(), StoreError> {
        let mut schemas = self.write()?;

        let duplicate = schemas.values().any(|existing| {
            !existing.is_deleted()
                && existing.tenant_id == schema.tenant_id
                && existing.entity_type == schema.entity_type
        });
        if duplicate {
            return Err(StoreError::conflict(format!(
                "entity type '{}' already defined for tenant",
                schema.entity_type
            )));
        }
        if schemas.contains_key(&schema.id) {
            return Err(StoreError::conflict(format!("schema {} already exists", schema.id)));
        }

        schemas.insert(schema.id, schema);
        Ok(())
    }

    async fn update(&self, schema: EntitySchema, expected_version: u32) -> Result<(), StoreError> {
        let mut schemas = self.write()?;

        let stored = schemas
            .get(&schema.id)
            .filter(|s| s.tenant_id == schema.tenant_id && !s.is_deleted())
            .ok_or_else(|| StoreError::not_found(format!("schema {}", schema.id)))?;

        if stored.version != expected_version {
            return Err(StoreError::conflict(format!(
                "schema {} version is {}, write expected {}",
                schema.id, stored.version, expected_version
            )));
        }

        schemas.insert(schema.id, schema);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
    ) -> Result<Option<EntitySchema>, StoreError> {
        let schemas = self.read()?;
        Ok(schemas
            .get(&schema_id)
            .filter(|s| s.tenant_id == tenant_id && !s.is_deleted())
            .map(Self::with_ordered_fields))
    }

    async fn get_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<EntitySchema>, StoreError> {
        let schemas = self.read()?;
        let mut result: Vec<EntitySchema> = schemas
            .values()
            .filter(|s| s.tenant_id == tenant_id && !s.is_deleted())
            .map(Self::with_ordered_fields)
            .collect();
        result.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(result)
    }

    async fn get_by_type_and_tenant(
        &self,
        entity_type: &str,
        tenant_id: TenantId,
    ) -> Result<Option<EntitySchema>, StoreError> {
        let schemas = self.read()?;
        Ok(schemas
            .values()
            .find(|s| {
                s.tenant_id == tenant_id && s.entity_type == entity_type && !s.is_deleted()
            })
            .map(Self::with_ordered_fields))
    }

    async fn exists(&self, entity_type: &str, tenant_id: TenantId) -> Result<bool, StoreError> {
        let schemas = self.read()?;
        Ok(schemas.values().any(|s| {
            s.tenant_id == tenant_id && s.entity_type == entity_type && !s.is_deleted()
        }))
    }

    async fn get_active(&self, tenant_id: TenantId) -> Result<Vec<EntitySchema>, StoreError> {
        let schemas = self.read()?;
        let mut result: Vec<EntitySchema> = schemas
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.is_active && !s.is_deleted())
            .map(|s| {
                let mut schema = Self::with_ordered_fields(s);
                schema.fields.retain(|f| !f.is_deleted());
                schema
            })
            .collect();
        result.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(result)
    }
}

#[async_trait]
impl FieldCatalog for InMemorySchemaStore {
    async fn fields_for_schema(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let schemas = self.read()?;
        Ok(schemas.get(&schema_id).map(Self::live_fields).unwrap_or_default())
    }

    async fn fields_for_schema_ordered(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let mut fields = self.fields_for_schema(schema_id).await?;
        fields.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(fields)
    }

    async fn field_exists(
        &self,
        schema_id: SchemaId,
        field_name: &str,
    ) -> Result<bool, StoreError> {
        let schemas = self.read()?;
        Ok(schemas
            .get(&schema_id)
            .is_some_and(|s| s.has_field(field_name)))
    }

    async fn fields_by_entity_type(
        &self,
        entity_type: &str,
        tenant_id: TenantId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let schemas = self.read()?;
        let Some(schema) = schemas.values().find(|s| {
            s.tenant_id == tenant_id && s.entity_type == entity_type && !s.is_deleted()
        }) else {
            return Ok(Vec::new());
        };
        let mut fields = Self::live_fields(schema);
        fields.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(fields)
    }

    async fn searchable_fields(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let mut fields = self.fields_for_schema(schema_id).await?;
        fields.retain(|f| f.is_searchable);
        Ok(fields)
    }

    async fn sortable_fields(
        &self,
        schema_id: SchemaId,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let mut fields = self.fields_for_schema(schema_id).await?;
        fields.retain(|f| f.is_sortable);
        Ok(fields)
    }
}
