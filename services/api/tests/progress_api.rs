use api_lib::{
    config::Config,
    web::{router, state::AppState},
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use watch_progress_core::{
    memory::{InMemoryCatalog, InMemoryIdentityGate, InMemoryStore},
    ProgressService, ProgressStore,
};

const SESSION: &str = "session-token-1";

struct TestApp {
    app: Router,
    store: Arc<InMemoryStore>,
    user_id: Uuid,
}

/// Catalog: anime 1 has episodes 1..=10, anime 2 has episodes 21..=23,
/// anime 3 has no episodes at all.
fn setup() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let catalog = InMemoryCatalog::new();
    catalog.add_anime(1, "Frieren", "/covers/frieren.jpg");
    for episode in 1..=10 {
        catalog.add_episode(1, 11, episode, episode as i32, 1400);
    }
    catalog.add_anime(2, "Dungeon Meshi", "/covers/meshi.jpg");
    for episode in 21..=23 {
        catalog.add_episode(2, 21, episode, (episode - 20) as i32, 1440);
    }
    catalog.add_anime(3, "Announced Only", "/covers/announced.jpg");

    let identity = InMemoryIdentityGate::new();
    let user_id = Uuid::new_v4();
    identity.insert_session(SESSION, user_id);

    let state = Arc::new(AppState {
        progress: ProgressService::new(store.clone(), Arc::new(catalog)),
        identity: Arc::new(identity),
        config: Arc::new(Config::for_tests()),
    });

    TestApp {
        app: router(state),
        store,
        user_id,
    }
}

fn request(method: &str, uri: &str, session: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, format!("theme=dark; session={}", session));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn save(app: &Router, episode_id: i64, position: i64, duration: i64) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/progress",
            Some(SESSION),
            Some(json!({
                "episode_id": episode_id,
                "position_seconds": position,
                "duration_seconds": duration,
                "is_completed": false
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
async fn every_endpoint_requires_a_session() {
    let t = setup();
    let calls = [
        ("POST", "/api/progress", Some(json!({"episode_id": 1, "position_seconds": 10}))),
        ("GET", "/api/progress?episode_id=1", None),
        ("GET", "/api/continue-watching", None),
        ("GET", "/api/history", None),
        ("DELETE", "/api/history", None),
    ];

    for (method, uri, body) in calls {
        let (status, json) = send(&t.app, request(method, uri, None, body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "NOT_LOGGED_IN");

        let (status, _) = send(&t.app, request(method, uri, Some("forged"), body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    assert!(t.store.list_progress(t.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unauthenticated_malformed_body_is_still_not_logged_in() {
    let t = setup();
    let req = Request::builder()
        .method("POST")
        .uri("/api/progress")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "NOT_LOGGED_IN");
}

#[tokio::test]
async fn health_is_public() {
    let t = setup();
    let (status, json) = send(&t.app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn completion_threshold_overrides_client_flag() {
    let t = setup();

    let body = save(&t.app, 4, 899, 1000).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Progress saved");
    assert_eq!(body["is_completed"], false);

    let body = save(&t.app, 5, 900, 1000).await;
    assert_eq!(body["is_completed"], true);
}

#[tokio::test]
async fn invalid_episode_id_is_rejected_without_writing() {
    let t = setup();
    let bodies = [
        json!({"position_seconds": 10, "duration_seconds": 100}),
        json!({"episode_id": 0, "position_seconds": 10}),
        json!({"episode_id": -7, "position_seconds": 10}),
        json!({"episode_id": "seven", "position_seconds": 10}),
    ];
    for body in bodies {
        let (status, json) = send(
            &t.app,
            request("POST", "/api/progress", Some(SESSION), Some(body.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["success"], false);
    }

    let req = Request::builder()
        .method("POST")
        .uri("/api/progress")
        .header(header::COOKIE, format!("session={}", SESSION))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"episode_id\": 3,"))
        .unwrap();
    let (status, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(t.store.list_progress(t.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn query_without_progress_returns_zero_values() {
    let t = setup();
    let (status, json) = send(
        &t.app,
        request("GET", "/api/progress?episode_id=9", Some(SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["position_seconds"], 0);
    assert_eq!(json["data"]["is_completed"], false);
    assert!(json["data"]["watched_at"].is_null());
}

#[tokio::test]
async fn query_requires_a_valid_episode_id() {
    let t = setup();
    for uri in ["/api/progress", "/api/progress?episode_id=0", "/api/progress?episode_id=abc"] {
        let (status, json) = send(&t.app, request("GET", uri, Some(SESSION), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn backward_seek_overwrites_stored_position() {
    let t = setup();
    save(&t.app, 2, 700, 1400).await;
    save(&t.app, 2, 95, 1400).await;

    let (_, json) = send(
        &t.app,
        request("GET", "/api/progress?episode_id=2", Some(SESSION), None),
    )
    .await;
    assert_eq!(json["data"]["position_seconds"], 95);
    assert!(json["data"]["watched_at"].is_string());
    assert_eq!(t.store.list_progress(t.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn episode_seven_end_to_end() {
    let t = setup();

    let body = save(&t.app, 7, 1300, 1400).await;
    assert_eq!(body["is_completed"], true);

    let (_, json) = send(
        &t.app,
        request("GET", "/api/progress?episode_id=7", Some(SESSION), None),
    )
    .await;
    assert_eq!(json["data"]["is_completed"], true);
    assert_eq!(json["data"]["position_seconds"], 1300);

    let (status, json) = send(
        &t.app,
        request("GET", "/api/continue-watching", Some(SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    let entry = &json["data"][0];
    assert_eq!(entry["anime_id"], 1);
    assert_eq!(entry["anime_title"], "Frieren");
    assert_eq!(entry["anime_cover"], "/covers/frieren.jpg");
    assert_eq!(entry["watched_episodes"], 1);
    assert_eq!(entry["total_episodes"], 10);
    assert_eq!(entry["last_watched_formatted"], "just now");
}

#[tokio::test]
async fn continue_watching_excludes_finished_series() {
    let t = setup();
    for episode in 1..=4 {
        save(&t.app, episode, 1300, 1400).await;
    }
    for episode in 21..=23 {
        save(&t.app, episode, 1440, 1440).await;
    }

    let (_, json) = send(
        &t.app,
        request("GET", "/api/continue-watching?limit=5", Some(SESSION), None),
    )
    .await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["data"][0]["anime_id"], 1);
    assert_eq!(json["data"][0]["completion_percentage"], 40.0);
}

#[tokio::test]
async fn continue_watching_orders_by_recent_activity() {
    let t = setup();
    save(&t.app, 1, 1300, 1400).await;
    save(&t.app, 21, 1400, 1440).await;

    let (_, json) = send(
        &t.app,
        request("GET", "/api/continue-watching", Some(SESSION), None),
    )
    .await;
    let order: Vec<i64> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["anime_id"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![2, 1]);

    // A partial report on anime 1 makes it the most recent again.
    save(&t.app, 2, 60, 1400).await;
    let (_, json) = send(
        &t.app,
        request("GET", "/api/continue-watching?limit=1", Some(SESSION), None),
    )
    .await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["data"][0]["anime_id"], 1);
}

#[tokio::test]
async fn continue_watching_is_empty_without_completed_episodes() {
    let t = setup();
    save(&t.app, 1, 100, 1400).await;
    let (status, json) = send(
        &t.app,
        request("GET", "/api/continue-watching", Some(SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert_eq!(json["data"], json!([]));
}

#[tokio::test]
async fn storage_failure_is_reported_not_swallowed() {
    let t = setup();
    t.store.set_failing(true);

    let (status, json) = send(
        &t.app,
        request(
            "POST",
            "/api/progress",
            Some(SESSION),
            Some(json!({"episode_id": 1, "position_seconds": 50, "duration_seconds": 1400})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "STORAGE_ERROR");

    t.store.set_failing(false);
    assert!(t.store.list_progress(t.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_lists_and_clears() {
    let t = setup();
    save(&t.app, 3, 400, 1400).await;
    save(&t.app, 22, 1440, 1440).await;

    let (status, json) = send(&t.app, request("GET", "/api/history", Some(SESSION), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["data"][0]["episode_id"], 22);
    assert_eq!(json["data"][0]["anime_title"], "Dungeon Meshi");
    assert_eq!(json["data"][0]["episode_number"], 2);
    assert_eq!(json["data"][0]["is_completed"], true);
    assert_eq!(json["data"][1]["position_seconds"], 400);

    let (status, json) = send(&t.app, request("DELETE", "/api/history", Some(SESSION), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 2);
    assert_eq!(json["message"], "History cleared");

    let (_, json) = send(&t.app, request("GET", "/api/history", Some(SESSION), None)).await;
    assert_eq!(json["count"], 0);
}
