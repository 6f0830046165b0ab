//! End-to-end registry behavior against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::Request;
use http::header::COOKIE;
use http::request::Parts;
use msm_session::{
    InMemoryStore, Key, PersistentStore, RegistryConfig, SessionRegistry, StoredRow, Value,
};

fn setup() -> (Arc<SessionRegistry>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let config = RegistryConfig::for_app("app")
        .with_cache_lifetime(Duration::from_secs(60))
        .with_max_age(Duration::from_secs(3600));
    let registry = SessionRegistry::new(config, store.clone()).unwrap();
    (Arc::new(registry), store)
}

fn request(uri: &str, cookie: Option<&str>) -> Parts {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(()).unwrap().into_parts().0
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fresh_requests_get_distinct_sessions() {
    let (registry, store) = setup();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let started = registry.start(&mut request("/", None), None).await.unwrap();
            assert!(started.created);
            started.session.id().to_string()
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }

    assert_eq!(ids.len(), 50);
    assert_eq!(registry.len().await, 50);
    assert_eq!(store.inserts(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_one_id_share_one_session() {
    let (registry, store) = setup();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .start(&mut request("/", Some("app-sid=shared")), None)
                .await
                .unwrap()
                .session
        }));
    }

    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap());
    }

    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    assert_eq!(registry.active_ids().await, vec!["shared".to_string()]);
    assert_eq!(store.inserts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_increments_are_not_lost() {
    let (registry, _store) = setup();
    let seed = registry.start(&mut request("/", None), None).await.unwrap();
    let cookie = seed.cookie.to_request_pair();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let registry = registry.clone();
        let cookie = cookie.clone();
        handles.push(tokio::spawn(async move {
            let started = registry
                .start(&mut request("/", Some(&cookie)), None)
                .await
                .unwrap();
            for _ in 0..10_000 {
                started.session.with_lock(|values| {
                    let current = values
                        .get(&Key::from("counter"))
                        .and_then(Value::as_int)
                        .unwrap_or(0);
                    values.insert(Key::from("counter"), Value::Int(current + 1));
                });
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        seed.session.get("counter").unwrap(),
        Some(Value::Int(1_000_000))
    );
}

#[tokio::test]
async fn test_idle_session_is_persisted_once_and_evicted() {
    let (registry, store) = setup();
    let now = Utc::now();

    let a = registry
        .start(&mut request("/", Some("app-sid=A")), None)
        .await
        .unwrap();
    let b = registry
        .start(&mut request("/", Some("app-sid=B")), None)
        .await
        .unwrap();
    a.session.set("cart", "3 items").unwrap();
    a.session.touch_at(now - chrono::Duration::seconds(120));
    b.session.touch_at(now);

    let report = registry.flush_at(now).await;
    assert_eq!(report.persisted, 1);
    assert_eq!(report.retained, 1);

    assert!(!registry.contains("A").await);
    assert!(registry.contains("B").await);
    assert_eq!(store.updates(), 1);

    let row = store.row("A").unwrap();
    let saved = registry.codec().decode(&row.data).unwrap();
    assert_eq!(saved.get(&Key::from("cart")), Some(&Value::from("3 items")));

    // A later request for A reloads what was written.
    let again = registry
        .start(&mut request("/", Some("app-sid=A")), None)
        .await
        .unwrap();
    assert!(!again.created);
    assert_eq!(again.session.get("cart").unwrap(), Some(Value::from("3 items")));
}

#[tokio::test]
async fn test_garbage_collection_deletes_only_rows_past_max_age() {
    let (registry, store) = setup();
    let now = Utc::now();
    let cutoff = now.timestamp() - 3600;

    store.seed(StoredRow {
        id: "x".to_string(),
        data: Vec::new(),
        created: cutoff - 10,
        updated: cutoff - 1,
    });
    store.seed(StoredRow {
        id: "y".to_string(),
        data: Vec::new(),
        created: cutoff - 10,
        updated: cutoff + 1,
    });

    assert_eq!(registry.garbage_collect_at(now).unwrap(), 1);
    assert!(store.row("x").is_none());
    assert!(store.row("y").is_some());
}

#[tokio::test]
async fn test_form_field_is_used_when_cookie_is_missing() {
    let (registry, store) = setup();
    store.insert_if_absent("S", &[], 1, 1).unwrap();

    let mut parts = request("/login", None);
    let started = registry
        .start(&mut parts, Some(b"user=bob&app-sid=S".as_slice()))
        .await
        .unwrap();

    assert_eq!(started.session.id(), "S");
    assert!(!started.created);
    let mirrored = parts.headers.get(COOKIE).unwrap().to_str().unwrap();
    assert_eq!(mirrored, "app-sid=S");
}

#[tokio::test]
async fn test_fresh_request_issues_cookie_and_inserts_row() {
    let (registry, store) = setup();

    let started = registry.start(&mut request("/", None), None).await.unwrap();

    assert!(started.created);
    assert_eq!(store.len(), 1);
    assert!(store.row(started.session.id()).is_some());
    let header = started.cookie.to_set_cookie();
    assert!(header.starts_with(&format!("app-sid={};", started.session.id())));
    assert!(header.contains("Max-Age=604800"));
}

#[tokio::test]
async fn test_shutdown_flushes_everything_then_closes() {
    let (registry, store) = setup();
    for id in ["p", "q"] {
        let cookie = format!("app-sid={id}");
        let started = registry
            .start(&mut request("/", Some(&cookie)), None)
            .await
            .unwrap();
        started.session.set("seen", true).unwrap();
    }

    let report = registry.flush_all().await;
    registry.store().close().unwrap();

    assert_eq!(report.persisted, 2);
    assert!(registry.is_empty().await);
    assert!(store.is_closed());
    for id in ["p", "q"] {
        let saved = registry.codec().decode(&store.row(id).unwrap().data).unwrap();
        assert_eq!(saved.get(&Key::from("seen")), Some(&Value::Bool(true)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_flush_evicts_idle_sessions() {
    let (registry, store) = setup();

    let idle = registry
        .start(&mut request("/", Some("app-sid=idle")), None)
        .await
        .unwrap();
    registry
        .start(&mut request("/", Some("app-sid=live")), None)
        .await
        .unwrap();
    idle.session
        .touch_at(Utc::now() - chrono::Duration::seconds(120));

    let schedules = registry.configure_gc(60, 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(registry.contains("idle").await);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!registry.contains("idle").await);
    assert!(registry.contains("live").await);
    assert_eq!(store.updates(), 1);

    schedules.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_gc_survives_a_failed_pass() {
    let (registry, store) = setup();
    store.seed(StoredRow {
        id: "ancient".to_string(),
        data: Vec::new(),
        created: 0,
        updated: 0,
    });
    store.set_failing(true);

    let schedules = registry.configure_gc(60, 1);

    tokio::time::sleep(Duration::from_secs(3601)).await;
    assert_eq!(store.len(), 1);
    assert_eq!(store.deletes(), 0);

    store.set_failing(false);
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(store.len(), 0);
    assert_eq!(store.deletes(), 1);

    schedules.stop().await;
}
