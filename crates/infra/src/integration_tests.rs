//! Integration tests for the full engine pipeline.
//!
//! Tests: SchemaDraft → SchemaRegistry → ValidationEngine → RecordStore
//!
//! Verifies:
//! - Schema lifecycle (create, field mutations, activation, soft delete)
//! - Record writes go through validation and version stamping
//! - Tenant isolation is preserved
//! - Optimistic concurrency conflicts are detected

mod tests {
    use chrono::{Duration, Utc};
    use serde_json::{Map, Value as JsonValue, json};

    use dynerp_core::{DomainError, PageRequest, TenantId, UserId};
    use dynerp_records::{DateRange, SortDirection};
    use dynerp_schema::{DataType, FieldSpec, FieldType};

    use crate::engine::{DynamicEntityEngine, SchemaDraft};
    use crate::record_store::InMemoryRecordStore;
    use crate::schema_store::InMemorySchemaStore;

    type TestEngine = DynamicEntityEngine<InMemorySchemaStore, InMemoryRecordStore>;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_user_id() -> UserId {
        UserId::new()
    }

    fn engine() -> TestEngine {
        // Structured log output when tests run with RUST_LOG set.
        dynerp_observability::init();
        DynamicEntityEngine::new(InMemorySchemaStore::new(), InMemoryRecordStore::new())
    }

    fn customer_draft() -> SchemaDraft {
        SchemaDraft {
            entity_type: "Customer".to_string(),
            display_name: "Customer".to_string(),
            description: Some("Customer master data".to_string()),
            fields: vec![
                FieldSpec {
                    is_required: true,
                    is_searchable: true,
                    is_sortable: true,
                    max_length: Some(100),
                    order_index: 0,
                    ..FieldSpec::new("Name", "Name", FieldType::Text, DataType::String)
                },
                FieldSpec {
                    is_searchable: true,
                    order_index: 1,
                    ..FieldSpec::new("Email", "Email", FieldType::Text, DataType::String)
                },
                FieldSpec {
                    min_value: Some(0.0),
                    max_value: Some(150.0),
                    order_index: 2,
                    ..FieldSpec::new("Age", "Age", FieldType::Number, DataType::Int)
                },
            ],
        }
    }

    fn payload(entries: JsonValue) -> Map<String, JsonValue> {
        match entries {
            JsonValue::Object(map) => map,
            _ => panic!("payload helper expects a JSON object"),
        }
    }

    #[tokio::test]
    async fn schema_create_then_fetch_roundtrip() {
        let engine = engine();
        let tenant = test_tenant_id();

        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        assert_eq!(schema.version, 1);
        assert!(schema.is_active);

        let fetched = engine.get_schema(tenant, schema.id).await.unwrap();
        assert_eq!(fetched, schema);

        let by_type = engine.get_schema_by_type(tenant, "Customer").await.unwrap();
        assert_eq!(by_type.id, schema.id);
    }

    #[tokio::test]
    async fn duplicate_entity_type_fails_with_conflict() {
        let engine = engine();
        let tenant = test_tenant_id();

        engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        let err = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }

        // A different tenant may reuse the entity type.
        engine
            .create_schema(test_tenant_id(), customer_draft(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn field_mutations_bump_the_schema_version() {
        let engine = engine();
        let tenant = test_tenant_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();

        let schema = engine
            .add_field(
                tenant,
                schema.id,
                FieldSpec::new("Phone", "Phone", FieldType::Text, DataType::String),
                None,
            )
            .await
            .unwrap();
        assert_eq!(schema.version, 2);

        let schema = engine
            .remove_field(tenant, schema.id, "Phone", None)
            .await
            .unwrap();
        assert_eq!(schema.version, 3);
        assert!(!schema.has_field("Phone"));

        // The store view reflects the mutation.
        let fetched = engine.get_schema(tenant, schema.id).await.unwrap();
        assert_eq!(fetched.version, 3);
    }

    #[tokio::test]
    async fn duplicate_field_add_fails_and_does_not_persist() {
        let engine = engine();
        let tenant = test_tenant_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();

        let err = engine
            .add_field(
                tenant,
                schema.id,
                FieldSpec::new("Name", "Name", FieldType::Text, DataType::String),
                None,
            )
            .await
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }

        let fetched = engine.get_schema(tenant, schema.id).await.unwrap();
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn deleted_schema_is_invisible_to_reads() {
        let engine = engine();
        let tenant = test_tenant_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();

        engine.delete_schema(tenant, schema.id, None).await.unwrap();

        let err = engine.get_schema(tenant, schema.id).await.unwrap_err();
        match err {
            DomainError::NotFound(_) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(engine.list_schemas(tenant).await.unwrap().is_empty());

        // The entity type becomes definable again.
        engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn record_create_validates_and_stamps_versions() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();

        let record = engine
            .create_record(
                tenant,
                schema.id,
                payload(json!({"Name": "Ada", "Email": "ada@example.com", "Age": 36})),
                user,
            )
            .await
            .unwrap();
        assert_eq!(record.schema_version, 1);
        assert_eq!(record.row_version, 1);
        assert_eq!(record.created_by, user);

        let fetched = engine.get_record(tenant, record.id).await.unwrap();
        assert_eq!(fetched, record);
        assert_eq!(fetched.data, record.data);
    }

    #[tokio::test]
    async fn invalid_payload_accumulates_all_violations() {
        let engine = engine();
        let tenant = test_tenant_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();

        // Missing required Name, out-of-range Age, one undeclared key.
        let err = engine
            .create_record(
                tenant,
                schema.id,
                payload(json!({"Age": 200, "Nickname": "Ada"})),
                test_user_id(),
            )
            .await
            .unwrap_err();

        let violations = err.violations().expect("expected a validation failure");
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["Name", "Age", "Nickname"]);
        assert!(engine.list_records(tenant, schema.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_schema_rejects_new_records_but_keeps_existing_readable() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        let record = engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Ada"})), user)
            .await
            .unwrap();

        engine.deactivate_schema(tenant, schema.id, None).await.unwrap();

        let err = engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Grace"})), user)
            .await
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert!(engine.get_record(tenant, record.id).await.is_ok());

        engine.reactivate_schema(tenant, schema.id, None).await.unwrap();
        engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Grace"})), user)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn record_update_requires_the_read_row_version() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        let record = engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Ada"})), user)
            .await
            .unwrap();

        let updated = engine
            .update_record(
                tenant,
                record.id,
                payload(json!({"Name": "Ada Lovelace"})),
                record.row_version,
                user,
            )
            .await
            .unwrap();
        assert_eq!(updated.row_version, 2);

        // A writer still holding row version 1 is stale now.
        let err = engine
            .update_record(
                tenant,
                record.id,
                payload(json!({"Name": "Someone Else"})),
                record.row_version,
                user,
            )
            .await
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }

        let fetched = engine.get_record(tenant, record.id).await.unwrap();
        assert_eq!(fetched.field_value("Name"), Some(&json!("Ada Lovelace")));
    }

    #[tokio::test]
    async fn updated_record_is_stamped_with_the_current_schema_version() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        let record = engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Ada"})), user)
            .await
            .unwrap();
        assert_eq!(record.schema_version, 1);

        engine
            .add_field(
                tenant,
                schema.id,
                FieldSpec::new("Phone", "Phone", FieldType::Text, DataType::String),
                None,
            )
            .await
            .unwrap();

        let updated = engine
            .update_record(
                tenant,
                record.id,
                payload(json!({"Name": "Ada", "Phone": "555-1234"})),
                record.row_version,
                user,
            )
            .await
            .unwrap();
        assert_eq!(updated.schema_version, 2);
    }

    #[tokio::test]
    async fn status_changes_move_records_out_of_the_active_subset() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        let a = engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Ada"})), user)
            .await
            .unwrap();
        let b = engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Grace"})), user)
            .await
            .unwrap();

        engine
            .set_record_status(tenant, b.id, "Archived", b.row_version, user)
            .await
            .unwrap();

        let active = engine.list_active_records(tenant, schema.id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
        assert_eq!(engine.list_records(tenant, schema.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleted_record_disappears_from_reads_but_payload_survives_in_store() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        let record = engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Ada"})), user)
            .await
            .unwrap();

        engine.delete_record(tenant, record.id, user).await.unwrap();

        let err = engine.get_record(tenant, record.id).await.unwrap_err();
        match err {
            DomainError::NotFound(_) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(engine.list_records(tenant, schema.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tenant_isolation_covers_schemas_and_records() {
        let engine = engine();
        let tenant_a = test_tenant_id();
        let tenant_b = test_tenant_id();
        let user = test_user_id();

        let schema = engine
            .create_schema(tenant_a, customer_draft(), None)
            .await
            .unwrap();
        let record = engine
            .create_record(tenant_a, schema.id, payload(json!({"Name": "Ada"})), user)
            .await
            .unwrap();

        // Known ids are worthless across the tenant boundary.
        assert!(engine.get_schema(tenant_b, schema.id).await.is_err());
        assert!(engine.get_record(tenant_b, record.id).await.is_err());
        assert!(engine.list_schemas(tenant_b).await.unwrap().is_empty());
        assert!(engine.list_records(tenant_b, schema.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn paging_covers_the_full_set_without_overlap() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        for i in 0..25 {
            engine
                .create_record(
                    tenant,
                    schema.id,
                    payload(json!({"Name": format!("Customer {i:02}")})),
                    user,
                )
                .await
                .unwrap();
        }

        let first = engine
            .records_paged(tenant, schema.id, PageRequest::new(1, 10))
            .await
            .unwrap();
        let second = engine
            .records_paged(tenant, schema.id, PageRequest::new(2, 10))
            .await
            .unwrap();
        let third = engine
            .records_paged(tenant, schema.id, PageRequest::new(3, 10))
            .await
            .unwrap();

        assert_eq!(first.total_records, 25);
        assert_eq!(first.total_pages(), 3);
        assert_eq!(first.items.len(), 10);
        assert_eq!(second.items.len(), 10);
        assert_eq!(third.items.len(), 5);
        assert!(!third.has_next_page());

        let mut seen: Vec<_> = first
            .items
            .iter()
            .chain(&second.items)
            .chain(&third.items)
            .map(|r| r.id)
            .collect();
        let count = seen.len();
        seen.sort_by(|a, b| a.as_uuid().cmp(b.as_uuid()));
        seen.dedup();
        assert_eq!(count, 25);
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn search_matches_any_named_field_and_rejects_undeclared_ones() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        engine
            .create_record(
                tenant,
                schema.id,
                payload(json!({"Name": "Ada Lovelace", "Email": "ada@example.com"})),
                user,
            )
            .await
            .unwrap();
        engine
            .create_record(
                tenant,
                schema.id,
                payload(json!({"Name": "Grace Hopper", "Email": "grace@ada-fans.org"})),
                user,
            )
            .await
            .unwrap();

        // Empty field list defaults to every searchable field.
        let hits = engine
            .search_records(tenant, schema.id, "ada", &[])
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = engine
            .search_records(tenant, schema.id, "ada", &["Name".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 0); // match is case-sensitive

        let hits = engine
            .search_records(tenant, schema.id, "Ada", &["Name".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let err = engine
            .search_records(tenant, schema.id, "Ada", &["Nope".to_string()])
            .await
            .unwrap_err();
        match err {
            DomainError::UnknownField(_) => {}
            other => panic!("expected UnknownField, got {other:?}"),
        }

        // Age is declared but not searchable.
        let err = engine
            .search_records(tenant, schema.id, "36", &["Age".to_string()])
            .await
            .unwrap_err();
        match err {
            DomainError::UnknownField(_) => {}
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn field_value_lookup_requires_a_declared_field_only() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        engine
            .create_record(
                tenant,
                schema.id,
                payload(json!({"Name": "Ada", "Age": 36})),
                user,
            )
            .await
            .unwrap();

        // Age is not searchable, but direct field lookup only needs it declared.
        let hits = engine
            .find_by_field_value(tenant, schema.id, "Age", "36")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let err = engine
            .find_by_field_value(tenant, schema.id, "Nope", "x")
            .await
            .unwrap_err();
        match err {
            DomainError::UnknownField(_) => {}
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn creator_and_date_range_queries_filter_the_scope() {
        let engine = engine();
        let tenant = test_tenant_id();
        let alice = test_user_id();
        let bob = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Ada"})), alice)
            .await
            .unwrap();
        engine
            .create_record(tenant, schema.id, payload(json!({"Name": "Grace"})), bob)
            .await
            .unwrap();

        let by_alice = engine
            .records_by_creator(tenant, schema.id, alice)
            .await
            .unwrap();
        assert_eq!(by_alice.len(), 1);
        assert_eq!(by_alice[0].created_by, alice);

        let now = Utc::now();
        let recent = engine
            .records_in_range(
                tenant,
                schema.id,
                DateRange::new(now - Duration::minutes(5), now),
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);

        let future = engine
            .records_in_range(
                tenant,
                schema.id,
                DateRange::new(now + Duration::minutes(5), now + Duration::minutes(10)),
            )
            .await
            .unwrap();
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn sorted_listing_requires_a_sortable_field() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        for name in ["Charlie", "Alice", "Bob"] {
            engine
                .create_record(tenant, schema.id, payload(json!({"Name": name})), user)
                .await
                .unwrap();
        }

        let sorted = engine
            .records_sorted(tenant, schema.id, "Name", SortDirection::Ascending)
            .await
            .unwrap();
        let names: Vec<&str> = sorted
            .iter()
            .filter_map(|r| r.field_value("Name").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(names, vec!["Alice", "Bob", "Charlie"]);

        // Email is declared but not sortable.
        let err = engine
            .records_sorted(tenant, schema.id, "Email", SortDirection::Ascending)
            .await
            .unwrap_err();
        match err {
            DomainError::UnknownField(_) => {}
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn listings_come_back_newest_first() {
        let engine = engine();
        let tenant = test_tenant_id();
        let user = test_user_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();
        let mut ids = Vec::new();
        for name in ["First", "Second", "Third"] {
            let record = engine
                .create_record(tenant, schema.id, payload(json!({"Name": name})), user)
                .await
                .unwrap();
            ids.push(record.id);
        }
        ids.reverse();

        let listed: Vec<_> = engine
            .list_records(tenant, schema.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn field_catalog_lists_live_fields_in_rendering_order() {
        let engine = engine();
        let tenant = test_tenant_id();
        let schema = engine
            .create_schema(tenant, customer_draft(), None)
            .await
            .unwrap();

        let names: Vec<_> = engine
            .list_fields(tenant, schema.id)
            .await
            .unwrap()
            .iter()
            .map(|f| f.field_name.clone())
            .collect();
        assert_eq!(names, vec!["Name", "Email", "Age"]);

        engine
            .remove_field(tenant, schema.id, "Email", None)
            .await
            .unwrap();
        let names: Vec<_> = engine
            .fields_by_entity_type(tenant, "Customer")
            .await
            .unwrap()
            .iter()
            .map(|f| f.field_name.clone())
            .collect();
        assert_eq!(names, vec!["Name", "Age"]);

        // Unknown entity types yield an empty catalog, not an error.
        assert!(engine
            .fields_by_entity_type(tenant, "Nope")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn defaults_fill_absent_fields_on_create() {
        let engine = engine();
        let tenant = test_tenant_id();
        let schema = engine
            .create_schema(
                tenant,
                SchemaDraft {
                    entity_type: "Ticket".to_string(),
                    display_name: "Ticket".to_string(),
                    description: None,
                    fields: vec![
                        FieldSpec {
                            is_required: true,
                            ..FieldSpec::new("Title", "Title", FieldType::Text, DataType::String)
                        },
                        FieldSpec {
                            default_value: Some("3".to_string()),
                            ..FieldSpec::new(
                                "Priority",
                                "Priority",
                                FieldType::Number,
                                DataType::Int,
                            )
                        },
                    ],
                },
                None,
            )
            .await
            .unwrap();

        let record = engine
            .create_record(
                tenant,
                schema.id,
                payload(json!({"Title": "Broken build"})),
                test_user_id(),
            )
            .await
            .unwrap();
        assert_eq!(record.field_value("Priority"), Some(&json!(3)));
    }
}
