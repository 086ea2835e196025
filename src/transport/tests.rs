use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Waker;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use futures::StreamExt;
use http_body::Body as _;
use tower::ServiceExt;

use super::body::{PullBody, PullSource};
use super::http::{AppState, router};
use crate::backend::BackendKind;
use crate::backend::memory::MemoryAdapter;
use crate::config::{BackendConfig, Settings};
use crate::controller::Gateway;
use crate::subscription::PollStatus;

fn app() -> (Router, Arc<MemoryAdapter>) {
    let adapter = Arc::new(MemoryAdapter::new());
    let mut gateway = Gateway::new();
    gateway.add_backend("mem", BackendConfig::new(BackendKind::Memory), adapter.clone());
    let state = AppState::new(Arc::new(gateway), &Settings::default());
    (router(state), adapter)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, "SSID=writer")
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(body: Body) -> Bytes {
    let mut stream = body.into_data_stream();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    Bytes::from(out)
}

/// Source replaying a fixed list of pulls.
struct Scripted {
    pulls: Mutex<VecDeque<(Option<Bytes>, PollStatus)>>,
    released: Arc<AtomicBool>,
}

impl PullSource for Scripted {
    fn pull(&self, _max_bytes: usize) -> (Option<Bytes>, PollStatus) {
        self.pulls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((None, PollStatus::Wait))
    }

    fn register_waker(&self, _waker: &Waker) {}

    fn release(self: Arc<Self>) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_pull_body_frames_and_release() {
    let released = Arc::new(AtomicBool::new(false));
    let source = Arc::new(Scripted {
        pulls: Mutex::new(VecDeque::from(vec![
            (Some(Bytes::from_static(b"one")), PollStatus::More),
            (Some(Bytes::new()), PollStatus::More),
            (Some(Bytes::from_static(b"two")), PollStatus::End),
        ])),
        released: released.clone(),
    });

    let body = PullBody::new(source, 1024);
    assert!(!body.is_end_stream());
    let bytes = body_bytes(Body::new(body)).await;
    assert_eq!(bytes, Bytes::from_static(b"onetwo"));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unknown_backend_is_404() {
    let (app, _) = app();
    let response = app.oneshot(get("/q/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(body["error"], "unknown_backend");
}

#[tokio::test]
async fn test_get_starts_stream_with_session_cookie() {
    let (app, _) = app();
    let response = app.clone().oneshot(get("/q/mem")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("SSID="));
    assert!(cookie.contains("; Path=/; Expires="));

    let request = Request::builder()
        .uri("/q/mem/a/b")
        .header(header::COOKIE, "SSID=returning")
        .header(header::ACCEPT, "text/plain")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("SSID=returning;"));
}

#[tokio::test]
async fn test_post_reaches_open_stream() {
    let (app, _) = app();
    let request = Request::builder()
        .uri("/q/mem/chat/%23")
        .header(header::COOKIE, "SSID=reader")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let mut stream = response.into_body().into_data_stream();

    // Unbound keys are rejected until the stream's subscription is set up.
    let mut published = false;
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(post("/q/mem?k=chat/room", "hi\nthere"))
            .await
            .unwrap();
        if response.status() == StatusCode::OK {
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json"
            );
            assert_eq!(
                body_bytes(response.into_body()).await,
                Bytes::from_static(b"{}")
            );
            published = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(published);

    let frame = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("frame before timeout")
        .unwrap()
        .unwrap();
    assert_eq!(frame, Bytes::from_static(b"data: hi\ndata: there\n\n"));
}

#[tokio::test]
async fn test_post_without_routing_key_is_500() {
    let (app, _) = app();
    let response = app.oneshot(post("/q/mem", "payload")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(body["error"], "unknown_routing_target");
}

#[tokio::test]
async fn test_dropping_stream_releases_subscription() {
    let (app, adapter) = app();
    let response = app.oneshot(get("/q/mem/x")).await.unwrap();

    for _ in 0..100 {
        if adapter.broker().lock().unwrap().topic_count() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(adapter.broker().lock().unwrap().topic_count(), 1);

    drop(response);
    for _ in 0..100 {
        if adapter.broker().lock().unwrap().topic_count() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(adapter.broker().lock().unwrap().topic_count(), 0);
}
