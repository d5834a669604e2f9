use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use clap::Parser;
use dedup_window::Backend;
use dedup_window::Id;
use dedup_window::LocalBackend;
use dedup_window::MembershipStore;
use dedup_window::StoreError;
use dedup_window::WindowTracker;
use http::Request;
use http::StatusCode;
use more_asserts::assert_le;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tower::ServiceExt;

use super::*;

#[derive(Debug)]
struct BrokenStore;

#[async_trait]
impl MembershipStore for BrokenStore {
    async fn try_add(&self, _id: Id) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug)]
struct BrokenBackend;

impl Backend for BrokenBackend {
    fn open(&self, _window: u64) -> Arc<dyn MembershipStore> {
        Arc::new(BrokenStore)
    }
}

fn notifier(method: NotifyMethod) -> NotifyDispatcher {
    NotifyDispatcher::new(method, Duration::from_secs(2)).unwrap()
}

fn app_with(backend: Arc<dyn Backend>) -> (Router, Arc<WindowTracker>) {
    let tracker = Arc::new(WindowTracker::new(backend, 0));
    let service = ObserveService::new(Arc::clone(&tracker), notifier(NotifyMethod::Get));
    (router(service), tracker)
}

async fn get_accept(app: Router, query: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .uri(format!("{ACCEPT_PATH}{query}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[derive(Debug, PartialEq)]
enum Received {
    Query(HashMap<String, String>),
    Json(serde_json::Value),
}

// Throwaway HTTP endpoint that records what it is sent
async fn receiver() -> (String, mpsc::UnboundedReceiver<Received>) {
    async fn on_get(
        State(tx): State<mpsc::UnboundedSender<Received>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> StatusCode {
        let _ = tx.send(Received::Query(params));
        StatusCode::OK
    }

    async fn on_post(
        State(tx): State<mpsc::UnboundedSender<Received>>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let _ = tx.send(Received::Json(body));
        StatusCode::ACCEPTED
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/hook", get(on_get).post(on_post))
        .with_state(tx);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hook"), rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Received>) -> Received {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification should arrive")
        .expect("receiver should still be running")
}

#[tokio::test]
async fn accepts_valid_id() {
    let (app, tracker) = app_with(Arc::new(LocalBackend));

    let (status, body) = get_accept(app, "?id=42").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    assert_eq!(tracker.current_count().await.unwrap(), 1);
}

#[tokio::test]
async fn missing_id_is_rejected() {
    let (app, tracker) = app_with(Arc::new(LocalBackend));

    let (status, body) = get_accept(app, "").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "failed");
    assert_eq!(tracker.current_count().await.unwrap(), 0);
}

#[tokio::test]
async fn non_integer_id_is_rejected() {
    for query in ["?id=abc", "?id=1.5", "?id=", "?id=99999999999999999999"] {
        let (app, _) = app_with(Arc::new(LocalBackend));
        let (status, body) = get_accept(app, query).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(body, "failed");
    }
}

#[tokio::test]
async fn negative_and_zero_ids_are_accepted() {
    let (app, tracker) = app_with(Arc::new(LocalBackend));

    for query in ["?id=0", "?id=-17"] {
        let (status, _) = get_accept(app.clone(), query).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(tracker.current_count().await.unwrap(), 2);
}

#[tokio::test]
async fn duplicate_is_ok_but_not_counted_twice() {
    let (app, tracker) = app_with(Arc::new(LocalBackend));

    for _ in 0..3 {
        let (status, body) = get_accept(app.clone(), "?id=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
    assert_eq!(tracker.current_count().await.unwrap(), 1);
}

#[tokio::test]
async fn store_failure_still_answers_ok() {
    let (app, _) = app_with(Arc::new(BrokenBackend));

    let (status, body) = get_accept(app, "?id=1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn store_failure_is_unconfirmed() {
    let tracker = Arc::new(WindowTracker::new(Arc::new(BrokenBackend), 0));
    let service = ObserveService::new(tracker, notifier(NotifyMethod::Get));

    let outcome = service
        .oneshot(Observation {
            id: 1,
            endpoint: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Unconfirmed);
}

#[tokio::test]
async fn get_notification_carries_count_in_query() {
    let (endpoint, mut rx) = receiver().await;

    let status = notifier(NotifyMethod::Get)
        .send(&endpoint, 12)
        .await
        .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        next(&mut rx).await,
        Received::Query(HashMap::from([("count".to_string(), "12".to_string())]))
    );
}

#[tokio::test]
async fn post_notification_carries_count_in_json() {
    let (endpoint, mut rx) = receiver().await;

    let status = notifier(NotifyMethod::Post)
        .send(&endpoint, 3)
        .await
        .unwrap();

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        next(&mut rx).await,
        Received::Json(serde_json::json!({ "count": 3 }))
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_an_error() {
    // Bind then drop so nothing is listening on the port
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let result = notifier(NotifyMethod::Get)
        .send(&format!("http://{addr}/hook"), 1)
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn only_new_ids_with_an_endpoint_notify() {
    let (endpoint, mut rx) = receiver().await;
    let (app, _) = app_with(Arc::new(LocalBackend));

    let with_endpoint = format!("?id=9&endpoint={endpoint}");
    let (status, _) = get_accept(app.clone(), &with_endpoint).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        next(&mut rx).await,
        Received::Query(HashMap::from([("count".to_string(), "1".to_string())]))
    );

    // Duplicate and blank endpoint stay silent
    get_accept(app.clone(), &with_endpoint).await;
    get_accept(app, "?id=10&endpoint=").await;
    assert!(
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn serves_until_shutdown() {
    let (endpoint, mut rx) = receiver().await;
    let config = Config::try_parse_from([
        "dedup-server",
        "--window",
        "1h",
        "--store",
        "local",
        "--sink",
        "log",
        "--notify-method",
        "post",
    ])
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(app::serve(config, listener, async move {
        let _ = stopped.await;
    }));

    let client = reqwest::Client::new();
    let url = format!("http://{addr}{ACCEPT_PATH}");
    for id in ["1", "2", "2"] {
        let response = client
            .get(&url)
            .query(&[("id", id), ("endpoint", endpoint.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    // Each new id notifies; the count is read after the id lands, so it is 1 or 2
    let mut counts = vec![];
    for _ in 0..2 {
        match next(&mut rx).await {
            Received::Json(body) => counts.push(body["count"].as_u64().unwrap()),
            other => panic!("expected a JSON notification, got {other:?}"),
        }
    }
    counts.sort();
    assert_le!(counts[0], 2);
    assert_eq!(counts[1], 2);

    drop(client);
    let _ = stop.send(());
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn serve_rejects_invalid_config() {
    let config = Config::try_parse_from(["dedup-server", "--window", "0s"]).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let result = app::serve(config, listener, std::future::ready(())).await;

    assert!(matches!(result, Err(ServerError::Config(_))));
}
