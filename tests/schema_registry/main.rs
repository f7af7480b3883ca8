//! Schema registry: get-or-create identity, lookups, queries and reactivity.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use std::sync::Arc;
use tidepool::{
    JsonSchema, RecordState, RuntimeSchemaRegistry, SchemaLocation, SchemaRegistry,
    SchemaRegistryOptions,
};
use tidepool_schema::{StoredSchemaData, SCHEMA_TYPENAME};

fn triple(version: &str) -> RegisterSchemaInput {
    RegisterSchemaInput::Triple {
        typename: CONTACT.to_string(),
        version: version.to_string(),
        json_schema: JsonSchema::object().with_property("name", json!({"type": "string"})),
        name: None,
    }
}

#[tokio::test]
async fn lookup_and_query_return_the_same_instance() {
    let t = TestDb::open().await;
    let registry = t.db.schema_registry();
    let records = registry.register([triple("0.1.0"), triple("0.2.0")]).unwrap();

    for record in &records {
        let id = record.id();
        let looked_up = registry.get_schema_by_id(&id).unwrap();
        let queried = registry
            .query(SchemaQuery::new().by_id(id.clone()))
            .run()
            .await
            .unwrap();
        assert_eq!(queried.len(), 1);
        assert!(Arc::ptr_eq(&looked_up, &queried[0]));
        assert!(Arc::ptr_eq(record, &looked_up));
    }
}

#[tokio::test]
async fn registering_a_backing_object_twice_is_get_or_create() {
    let t = TestDb::open().await;
    let registry = t.db.schema_registry();
    let record = registry.register([triple("0.1.0")]).unwrap().remove(0);
    let backing = Arc::clone(record.backing_object().unwrap());

    let again = registry.register_stored_object(Arc::clone(&backing)).unwrap();
    let via_definition = registry
        .register([RegisterSchemaInput::Definition(record.to_definition())])
        .unwrap()
        .remove(0);

    assert!(Arc::ptr_eq(&record, &again));
    assert!(Arc::ptr_eq(&record, &via_definition));
    assert_eq!(registry.records().len(), 1);
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn two_registries_over_one_store_keep_separate_records() {
    let t = TestDb::open().await;
    let record = t
        .db
        .schema_registry()
        .register([triple("0.1.0")])
        .unwrap()
        .remove(0);

    let other = SchemaRegistry::new(
        Arc::clone(&t.store) as Arc<dyn ObjectStore>,
        Arc::clone(t.db.runtime()),
        SchemaRegistryOptions::default(),
    );
    other.open().await.unwrap();
    let mirrored = other.get_schema_by_id(&record.id()).unwrap();
    assert!(!Arc::ptr_eq(&record, &mirrored));
    assert_eq!(mirrored.typename(), CONTACT);
    other.close().await.unwrap();
}

#[tokio::test]
async fn version_ranges_are_rejected() {
    let t = TestDb::open().await;
    let err = t
        .db
        .schema_registry()
        .query(SchemaQuery::new().by_typename(CONTACT).with_version(">=0.1.0"))
        .run()
        .await
        .unwrap_err();
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("Semver version ranges not supported"));
}

#[tokio::test]
async fn system_schema_is_hidden_by_default() {
    let t = TestDb::open().await;
    let registry = t.db.schema_registry();

    let visible = registry.query(SchemaQuery::new()).run().await.unwrap();
    assert!(visible.iter().all(|r| r.typename() != SCHEMA_TYPENAME));

    let all = registry
        .query(SchemaQuery::new().including_system())
        .run()
        .await
        .unwrap();
    assert!(all.iter().any(|r| r.typename() == SCHEMA_TYPENAME));
}

#[tokio::test]
async fn database_only_locations_skip_static_records() {
    let mut config = DatabaseConfig::default();
    config.schema.include_runtime_by_default = false;
    let t = TestDb::open_with(config).await;
    t.db.runtime().register(contact("9.9.9")).unwrap();
    t.db.schema_registry().register([triple("0.1.0")]).unwrap();

    let default = t.db.schema_registry().query(SchemaQuery::new()).run().await.unwrap();
    assert_eq!(default.len(), 1);
    assert!(default[0].is_mutable());

    let both = t
        .db
        .schema_registry()
        .query(SchemaQuery::new().in_locations(vec![SchemaLocation::Runtime, SchemaLocation::Database]))
        .run()
        .await
        .unwrap();
    assert_eq!(both.len(), 2);
}

#[tokio::test]
async fn lazily_loaded_schemas_register_on_lookup() {
    let store = Arc::new(MemoryObjectStore::with_random_namespace());
    let id = store
        .stage_unloaded(StoredSchemaData::draft_for(&contact("0.1.0"), None).unwrap())
        .unwrap();
    let mut config = DatabaseConfig::default();
    config.schema.preload_on_open = false;
    let db = Database::builder()
        .config(config)
        .store(Arc::clone(&store) as Arc<dyn ObjectStore>)
        .open()
        .await
        .unwrap();

    let registry = db.schema_registry();
    assert!(registry.get_schema_by_id(id.as_str()).is_none());
    let record = registry.load_schema_by_id(id.as_str()).await.unwrap().unwrap();
    assert_eq!(record.version(), "0.1.0");
    assert!(registry.has_schema(&record));
    db.close().await.unwrap();
}

#[tokio::test]
async fn stored_schema_lifecycle_follows_backing_object() {
    let t = TestDb::open().await;
    let registry = t.db.schema_registry();
    let record = registry.register([triple("0.1.0")]).unwrap().remove(0);
    let first = record.snapshot();

    record.set_name("Person").unwrap();
    assert_eq!(record.state(), RecordState::Invalidated);
    assert_eq!(record.name().as_deref(), Some("Person"));
    assert_eq!(record.state(), RecordState::Registered);
    assert!(!Arc::ptr_eq(&first, &record.snapshot()));

    t.db.remove(record.backing_object_id().unwrap()).unwrap();
    assert_eq!(record.state(), RecordState::Removed);
    assert!(registry.records().is_empty());
}

#[tokio::test]
async fn schema_query_subscribers_see_registrations() {
    let t = TestDb::open().await;
    let registry = t.db.schema_registry();
    let query = registry.query(SchemaQuery::new().by_typename(CONTACT));

    let (calls, callback) = counter::<Arc<TypeRecord>>();
    let sub = query.subscribe(callback, SubscribeOptions::default());
    query.settle().await;
    assert!(query.is_running());
    let baseline = count(&calls);

    registry.register([triple("0.1.0")]).unwrap();
    assert_eq!(count(&calls), baseline + 1);
    assert_eq!(query.results().unwrap().len(), 1);

    drop(sub);
    query.settle().await;
    assert!(!query.is_running());
    registry.register([triple("0.2.0")]).unwrap();
    assert_eq!(count(&calls), baseline + 1);
}

#[tokio::test]
async fn malformed_stored_schema_is_excluded_from_queries() {
    let t = TestDb::open().await;
    let broken = t
        .db
        .add(ObjectDraft::typed(
            tidepool_schema::schema_type_ref(),
            json!({"typename": CONTACT, "version": "0.1.0", "jsonSchema": {"type": "array"}}),
        ))
        .unwrap();

    let results = t
        .db
        .schema_registry()
        .query(SchemaQuery::new().by_typename(CONTACT))
        .run()
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(t.db.schema_registry().get_schema_by_id(broken.id().as_str()).is_some());
}

#[tokio::test]
async fn shared_runtime_registry_is_visible_to_every_database() {
    let runtime = Arc::new(RuntimeSchemaRegistry::new());
    runtime.register(contact("1.0.0")).unwrap();

    let a = Database::builder().runtime(Arc::clone(&runtime)).open().await.unwrap();
    let b = Database::builder().runtime(Arc::clone(&runtime)).open().await.unwrap();
    let from_a = a.schema_registry().get_schema_by_typename(CONTACT).unwrap();
    let from_b = b.schema_registry().get_schema_by_typename(CONTACT).unwrap();
    assert!(Arc::ptr_eq(&from_a, &from_b));
    assert!(a.schema_registry().has_schema(&contact("1.0.0")));
}
