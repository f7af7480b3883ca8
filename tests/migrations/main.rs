//! Migration pipeline: chained specs, idempotence, hooks and flushing.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tidepool::{MigrationEvent, ObjectSnapshot};

fn split_name() -> MigrationSpec {
    MigrationSpec::define(&contact("0.1.0"), &contact("0.2.0"), |from: ObjectSnapshot, _| async move {
        let first = from.get_str("firstName").unwrap_or_default().to_string();
        let last = from.get_str("lastName").unwrap_or_default().to_string();
        Ok(json!({ "name": format!("{first} {last}") }))
    })
    .unwrap()
}

fn add_email() -> MigrationSpec {
    MigrationSpec::define(&contact("0.2.0"), &contact("0.3.0"), |from: ObjectSnapshot, _| async move {
        let name = from.get_str("name").unwrap_or_default().to_string();
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        Ok(json!({ "name": name, "email": email }))
    })
    .unwrap()
}

#[tokio::test]
async fn contact_scenario_migrates_through_two_versions() {
    let t = TestDb::open().await;
    let john = t.add_typed(&contact("0.1.0"), json!({"firstName": "John", "lastName": "Doe"}));

    t.db.run_migrations(&[split_name()]).await.unwrap();
    assert_eq!(john.data(), json!({"name": "John Doe"}));

    t.db.run_migrations(&[add_email()]).await.unwrap();
    let migrated = t.objects_of(&contact("0.3.0")).await;
    assert_eq!(migrated.len(), 1);
    assert_eq!(
        migrated[0].data(),
        json!({"name": "John Doe", "email": "john.doe@example.com"})
    );
    assert_eq!(migrated[0].id(), john.id());
}

#[tokio::test]
async fn chained_specs_run_in_one_call() {
    let t = TestDb::open().await;
    for (first, last) in [("John", "Doe"), ("Ada", "Lovelace")] {
        t.add_typed(&contact("0.1.0"), json!({"firstName": first, "lastName": last}));
    }

    t.db.run_migrations(&[split_name(), add_email()]).await.unwrap();

    assert!(t.objects_of(&contact("0.1.0")).await.is_empty());
    assert!(t.objects_of(&contact("0.2.0")).await.is_empty());
    let mut emails: Vec<String> = t
        .objects_of(&contact("0.3.0"))
        .await
        .iter()
        .map(|o| o.snapshot().get_str("email").unwrap().to_string())
        .collect();
    emails.sort();
    assert_eq!(emails, vec!["ada.lovelace@example.com", "john.doe@example.com"]);
}

#[tokio::test]
async fn rerunning_a_spec_changes_nothing() {
    let t = TestDb::open().await;
    t.add_typed(&contact("0.1.0"), json!({"firstName": "John", "lastName": "Doe"}));

    t.db.run_migrations(&[split_name()]).await.unwrap();
    let once: Vec<_> = t
        .objects_of(&contact("0.2.0"))
        .await
        .iter()
        .map(|o| o.snapshot())
        .collect();

    t.db.run_migrations(&[split_name()]).await.unwrap();
    let twice: Vec<_> = t
        .objects_of(&contact("0.2.0"))
        .await
        .iter()
        .map(|o| o.snapshot())
        .collect();

    assert_eq!(once, twice);
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn other_types_and_versions_are_untouched() {
    let t = TestDb::open().await;
    let newer = t.add_typed(&contact("0.2.0"), json!({"name": "Already Done"}));
    let task = t
        .db
        .add(ObjectDraft::typed(Dxn::typed("example.com/type/Task", "0.1.0"), json!({"title": "x"})))
        .unwrap();

    t.db.run_migrations(&[split_name()]).await.unwrap();
    assert_eq!(newer.data(), json!({"name": "Already Done"}));
    assert_eq!(task.data(), json!({"title": "x"}));
}

#[tokio::test]
async fn deleted_objects_are_not_migrated() {
    let t = TestDb::open().await;
    let gone = t.add_typed(&contact("0.1.0"), json!({"firstName": "Gone", "lastName": "Away"}));
    t.db.remove(gone.id()).unwrap();

    t.db.run_migrations(&[split_name()]).await.unwrap();
    assert_eq!(gone.type_ref(), Some(contact("0.1.0").static_type_ref()));
}

#[tokio::test]
async fn hook_runs_once_per_object_per_run() {
    let t = TestDb::open().await;
    t.add_typed(&contact("0.1.0"), json!({"firstName": "A", "lastName": "B"}));
    t.add_typed(&contact("0.1.0"), json!({"firstName": "C", "lastName": "D"}));

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let spec = split_name().on_migration(move |event: MigrationEvent| {
        let seen = Arc::clone(&seen);
        async move {
            assert!(event.before.get_str("firstName").is_some());
            assert!(event.object.get(&"name".into()).is_some());
            assert!(event.db.is_open());
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    t.db.run_migrations(&[spec.clone()]).await.unwrap();
    t.db.run_migrations(&[spec]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hook_may_write_new_objects() {
    let t = TestDb::open().await;
    t.add_typed(&contact("0.1.0"), json!({"firstName": "John", "lastName": "Doe"}));

    let audit = TypeDefinition::new("example.com/type/Audit", "0.1.0");
    let audit_ref = audit.static_type_ref();
    let spec = split_name().on_migration(move |event: MigrationEvent| {
        let audit_ref = audit_ref.clone();
        async move {
            event.db.add(ObjectDraft::typed(
                audit_ref,
                json!({"migrated": event.object.id().to_string()}),
            ))?;
            Ok(())
        }
    });

    t.db.run_migrations(&[spec]).await.unwrap();
    assert_eq!(t.objects_of(&audit).await.len(), 1);
}

#[tokio::test]
async fn flush_follows_config() {
    let t = TestDb::open().await;
    t.add_typed(&contact("0.1.0"), json!({"firstName": "John", "lastName": "Doe"}));
    t.db.run_migrations(&[split_name()]).await.unwrap();
    assert_eq!(t.store.pending_writes(), 0);

    let mut config = DatabaseConfig::default();
    config.migration.flush_after_run = false;
    let t = TestDb::open_with(config).await;
    t.add_typed(&contact("0.1.0"), json!({"firstName": "John", "lastName": "Doe"}));
    t.db.run_migrations(&[split_name()]).await.unwrap();
    assert!(t.store.pending_writes() > 0);
}

#[tokio::test]
async fn flush_setting_loads_from_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("tidepool.toml");
    std::fs::write(&path, "[migration]\nflush_after_run = false\n").unwrap();

    let store = Arc::new(MemoryObjectStore::with_random_namespace());
    let db = Database::builder()
        .config_file(&path)
        .unwrap()
        .store(Arc::clone(&store) as Arc<dyn ObjectStore>)
        .open()
        .await
        .unwrap();
    db.add(ObjectDraft::typed(
        contact("0.1.0").static_type_ref(),
        json!({"firstName": "Ada", "lastName": "Lovelace"}),
    ))
    .unwrap();
    db.run_migrations(&[split_name()]).await.unwrap();
    assert!(store.pending_writes() > 0);

    db.close().await.unwrap();
    assert_eq!(store.pending_writes(), 0);
}

#[tokio::test]
async fn stored_schema_records_declare_migrations() {
    let t = TestDb::open().await;
    let registry = t.db.schema_registry();
    let records = registry
        .register([
            RegisterSchemaInput::Definition(contact("0.1.0")),
            RegisterSchemaInput::Definition(contact("0.2.0")),
        ])
        .unwrap();
    let (v1, v2) = (&records[0], &records[1]);

    let object = t
        .db
        .add(ObjectDraft::typed(v1.type_ref(), json!({"firstName": "A", "lastName": "B"})))
        .unwrap();
    let spec = MigrationSpec::define(v1, v2, |from: ObjectSnapshot, _| async move {
        Ok(json!({"name": from.get_str("firstName").unwrap_or_default()}))
    })
    .unwrap();

    t.db.run_migrations(&[spec]).await.unwrap();
    assert_eq!(object.type_ref(), Some(v2.type_ref()));
    assert_eq!(object.data(), json!({"name": "A"}));
}

#[tokio::test]
async fn migrated_objects_notify_subscribers() {
    let t = TestDb::open().await;
    let john = t.add_typed(&contact("0.1.0"), json!({"firstName": "John", "lastName": "Doe"}));

    let query = t.db.query(Filter::type_ref(contact("0.2.0").static_type_ref()));
    let (calls, callback) = counter::<Arc<ObjectCore>>();
    let _sub = query.subscribe(callback, SubscribeOptions::default());
    query.settle().await;

    t.db.run_migrations(&[split_name()]).await.unwrap();
    assert!(count(&calls) >= 1);
    let results = query.results().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), john.id());
}
