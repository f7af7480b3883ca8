//! Filter engine and prepared queries against a live database.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use std::sync::Arc;
use tidepool::{encode_reference, DeletedPolicy, ForeignKey, QueryOptions};

async fn ids(q: &PreparedQuery<Arc<ObjectCore>>) -> Vec<ObjectId> {
    let mut ids: Vec<_> = q.run().await.unwrap().iter().map(|o| o.id().clone()).collect();
    ids.sort();
    ids
}

fn sorted(mut ids: Vec<ObjectId>) -> Vec<ObjectId> {
    ids.sort();
    ids
}

#[tokio::test]
async fn typename_without_version_matches_every_version() {
    let t = TestDb::open().await;
    let a = t.add_typed(&contact("0.1.0"), json!({}));
    let b = t.add_typed(&contact("0.2.0"), json!({}));
    let untyped = t.db.add(ObjectDraft::new(json!({}))).unwrap();

    let any = t.db.query(Filter::typename(CONTACT).unwrap());
    assert_eq!(ids(&any).await, sorted(vec![a.id().clone(), b.id().clone()]));

    let exact = t.db.query(Filter::type_ref(contact("0.2.0").static_type_ref()));
    assert_eq!(ids(&exact).await, vec![b.id().clone()]);

    let expando = t.db.query(Filter::type_ref(Dxn::untyped()));
    assert_eq!(ids(&expando).await, vec![untyped.id().clone()]);
}

#[tokio::test]
async fn version_ranges_fail_loudly() {
    let t = TestDb::open().await;
    t.add_typed(&contact("0.1.0"), json!({}));
    let err = t
        .db
        .query(Filter::type_ref(Dxn::typed(CONTACT, "^0.1.0")))
        .run()
        .await
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[tokio::test]
async fn references_compare_by_target() {
    let t = TestDb::open().await;
    let org = t.db.add(ObjectDraft::new(json!({"name": "Org"}))).unwrap();
    let member = t
        .add_typed(&contact("0.1.0"), json!({"org": encode_reference(&Dxn::local_object(org.id().clone()))}));
    t.add_typed(&contact("0.1.0"), json!({"org": {"/": "dxn:echo:@:SOMEONEELSE"}}));

    let mut properties = serde_json::Map::new();
    properties.insert(
        "org".into(),
        encode_reference(&Dxn::object(t.db.namespace(), org.id().clone())),
    );
    let q = t.db.query(Filter::properties(properties));
    assert_eq!(ids(&q).await, vec![member.id().clone()]);
}

#[tokio::test]
async fn negation_never_resurrects_deleted_objects() {
    let t = TestDb::open().await;
    let live = t.add_typed(&contact("0.1.0"), json!({"name": "live"}));
    let dead = t.add_typed(&contact("0.1.0"), json!({"name": "dead"}));
    t.db.remove(dead.id()).unwrap();

    let nobody = Filter::properties(
        [("name".to_string(), json!("nobody"))].into_iter().collect(),
    );
    let q = t.db.query(Filter::not(nobody.clone()));
    assert_eq!(ids(&q).await, vec![live.id().clone()]);

    let with_deleted = t.db.query(
        Filter::not(nobody.clone()).with_options(QueryOptions::deleted(DeletedPolicy::Include)),
    );
    assert_eq!(ids(&with_deleted).await, sorted(vec![live.id().clone(), dead.id().clone()]));

    let only_deleted =
        t.db.query(Filter::all().with_options(QueryOptions::deleted(DeletedPolicy::Only)));
    assert_eq!(ids(&only_deleted).await, vec![dead.id().clone()]);
}

#[tokio::test]
async fn composite_filters() {
    let t = TestDb::open().await;
    let a = t.add_typed(&contact("0.1.0"), json!({"name": "a", "vip": true}));
    let b = t.add_typed(&contact("0.1.0"), json!({"name": "b", "vip": false}));
    let task = t
        .db
        .add(ObjectDraft::typed(Dxn::typed("example.com/type/Task", "0.1.0"), json!({"name": "a"})))
        .unwrap();

    let vip = Filter::properties([("vip".to_string(), json!(true))].into_iter().collect());
    let both = t.db.query(Filter::and(vec![Filter::typename(CONTACT).unwrap(), vip.clone()]));
    assert_eq!(ids(&both).await, vec![a.id().clone()]);

    let either = t.db.query(Filter::or(vec![vip, Filter::ids([task.id().clone()])]));
    assert_eq!(ids(&either).await, sorted(vec![a.id().clone(), task.id().clone()]));

    let by_predicate = t.db.query(
        Filter::typename(CONTACT)
            .unwrap()
            .with_predicate(|core| core.get(&"name".into()) == Some(json!("b"))),
    );
    assert_eq!(ids(&by_predicate).await, vec![b.id().clone()]);
}

#[tokio::test]
async fn property_filters_follow_id_rules() {
    let t = TestDb::open().await;
    let a = t.add_typed(&contact("0.1.0"), json!({"name": "a"}));
    t.add_typed(&contact("0.1.0"), json!({"name": "b"}));

    let by_id = Filter::from_property_filter(&json!({"id": a.id().as_str()})).unwrap();
    assert_eq!(ids(&t.db.query(by_id)).await, vec![a.id().clone()]);

    let typed = Filter::from_property_filter(&json!({"__typename": CONTACT, "name": "a"})).unwrap();
    assert_eq!(ids(&t.db.query(typed)).await, vec![a.id().clone()]);

    let err = Filter::from_property_filter(&json!({"id": a.id().as_str(), "name": "a"})).unwrap_err();
    assert!(err.is_usage());
}

#[tokio::test]
async fn foreign_keys_and_text() {
    let t = TestDb::open().await;
    let tagged = t
        .db
        .add(ObjectDraft::new(json!({})).with_meta_key(ForeignKey::new("github.com", "42")))
        .unwrap();
    t.db.add(ObjectDraft::new(json!({}))).unwrap();

    let q = t
        .db
        .query(Filter::foreign_keys(vec![ForeignKey::new("github.com", "42")]));
    assert_eq!(ids(&q).await, vec![tagged.id().clone()]);

    let err = t.db.query(Filter::text("hello")).run().await.unwrap_err();
    assert!(err.is_unsupported());
}

#[tokio::test]
async fn results_require_a_subscriber() {
    let t = TestDb::open().await;
    t.add_typed(&contact("0.1.0"), json!({}));
    let q = t.db.query(Filter::typename(CONTACT).unwrap());

    let err = q.results().unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("Use query.run() instead"));
    assert_eq!(q.run_sync().unwrap().len(), 1);

    let seen = Arc::new(parking_lot::Mutex::new(None));
    let sink = Arc::clone(&seen);
    let sub = q.subscribe(
        move |q| *sink.lock() = Some(q.results().map(|r| r.len())),
        SubscribeOptions::fire(),
    );
    assert_eq!(seen.lock().take().unwrap().unwrap(), 1);
    drop(sub);
    q.settle().await;
}

#[tokio::test]
async fn first_on_empty_query_reports_zero_entries() {
    let t = TestDb::open().await;
    let err = t
        .db
        .query(Filter::typename(CONTACT).unwrap())
        .first()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoResults));
    assert_eq!(err.to_string(), "Query returned 0 entries");
}

#[tokio::test]
async fn refcounting_starts_once_and_stops_once() {
    let t = TestDb::open().await;
    let q = t.db.query(Filter::typename(CONTACT).unwrap());
    let listeners_before = t.store.changes().listener_count();

    let first = q.subscribe(|_| {}, SubscribeOptions::default());
    let second = q.subscribe(|_| {}, SubscribeOptions::default());
    q.settle().await;
    assert!(q.is_running());
    assert_eq!(t.store.changes().listener_count(), listeners_before + 1);

    drop(first);
    q.settle().await;
    assert!(q.is_running());

    second.unsubscribe();
    q.settle().await;
    assert!(!q.is_running());
    assert_eq!(t.store.changes().listener_count(), listeners_before);
}

#[tokio::test]
async fn run_sync_may_lag_behind_run() {
    let t = TestDb::open().await;
    t.add_typed(&contact("0.1.0"), json!({}));
    t.store
        .stage_unloaded(ObjectDraft::typed(contact("0.1.0").static_type_ref(), json!({})))
        .unwrap();

    let q = t.db.query(Filter::typename(CONTACT).unwrap());
    assert_eq!(q.run_sync().unwrap().len(), 1);
    assert_eq!(q.run().await.unwrap().len(), 2);
    assert_eq!(q.run_sync().unwrap().len(), 2);
}

#[tokio::test]
async fn updates_to_matched_objects_notify() {
    let t = TestDb::open().await;
    let a = t.add_typed(&contact("0.1.0"), json!({"name": "a"}));
    let q = t.db.query(Filter::typename(CONTACT).unwrap());
    let (calls, callback) = counter::<Arc<ObjectCore>>();
    let _sub = q.subscribe(callback, SubscribeOptions::default());
    q.settle().await;

    a.set(&"name".into(), json!("renamed")).unwrap();
    assert_eq!(count(&calls), 1);
    t.add_typed(&contact("0.1.0"), json!({"name": "b"}));
    assert_eq!(count(&calls), 2);
    assert_eq!(q.results().unwrap().len(), 2);
}

#[tokio::test]
async fn store_mutations_notify_once() {
    let t = TestDb::open().await;
    let a = t.add_typed(&contact("0.1.0"), json!({"name": "a"}));
    let q = t.db.query(Filter::typename(CONTACT).unwrap());
    let (calls, callback) = counter::<Arc<ObjectCore>>();
    let _sub = q.subscribe(callback, SubscribeOptions::default());
    q.settle().await;

    t.store
        .replace_data(
            a.id(),
            json!({"name": "replaced"}),
            Some(contact("0.1.0").static_type_ref()),
        )
        .unwrap();
    assert_eq!(count(&calls), 1);
    assert_eq!(q.results().unwrap().len(), 1);

    t.db.remove(a.id()).unwrap();
    assert_eq!(count(&calls), 2);
    assert!(q.results().unwrap().is_empty());
}

mod laws {
    use super::*;
    use proptest::prelude::*;
    use tidepool::{matches, MatchContext};

    proptest! {
        #[test]
        fn negation_respects_visibility(
            name in "[a-c]",
            wanted in "[a-c]",
            deleted in any::<bool>(),
        ) {
            let store = MemoryObjectStore::with_random_namespace();
            let core = store.add(ObjectDraft::new(json!({ "name": name }))).unwrap();
            if deleted {
                store.remove(core.id()).unwrap();
            }
            let ctx = MatchContext::new(store.namespace());
            let f = Filter::properties([("name".to_string(), json!(wanted))].into_iter().collect());

            let negated = matches(&Filter::not(f.clone()), &core, &ctx).unwrap();
            let plain = matches(&f, &core, &ctx).unwrap();
            prop_assert_eq!(negated, !deleted && !plain);
        }
    }
}
