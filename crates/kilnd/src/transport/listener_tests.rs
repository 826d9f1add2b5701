//! Tests for the TCP listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::Uri;
use axum::routing::get;
use reqwest::Method;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::listener::SocketListener;
use super::{ListenerError, http_get, http_status, not_found};

#[fixture]
fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

async fn count(State(count): State<Arc<AtomicUsize>>) -> axum::Json<Value> {
    let seen = count.fetch_add(1, Ordering::SeqCst) + 1;
    axum::Json(json!({ "seen": seen }))
}

async fn echo(uri: Uri) -> axum::Json<Value> {
    axum::Json(json!({ "path": uri.path() }))
}

#[rstest]
fn serves_requests_on_the_bound_port(counter: Arc<AtomicUsize>) {
    let listener = SocketListener::bind("test", "127.0.0.1", 0).expect("bind tcp listener");
    let addr = listener.local_addr();
    assert_ne!(addr.port(), 0, "ephemeral port should be resolved at bind");
    let router = Router::new()
        .route("/count", get(count))
        .with_state(Arc::clone(&counter));
    let handle = listener.start(router).expect("start listener");
    assert_eq!(handle.port(), addr.port());

    let (status, body) = http_get(addr, "/count");
    assert_eq!(status, 200);
    assert_eq!(body["seen"], 1);
    let (_, body) = http_get(addr, "/count");
    assert_eq!(body["seen"], 2);

    handle.stop().expect("stop listener");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn binding_a_used_port_fails() {
    let first = SocketListener::bind("first", "127.0.0.1", 0).expect("bind first listener");
    let port = first.local_addr().port();
    let error = SocketListener::bind("second", "127.0.0.1", port).expect_err("port in use");
    assert!(matches!(error, ListenerError::BindTcp { .. }));
}

#[test]
fn unknown_paths_get_a_json_not_found() {
    let listener = SocketListener::bind("echo", "127.0.0.1", 0).expect("bind listener");
    let addr = listener.local_addr();
    let router = Router::new().route("/echo", get(echo)).fallback(not_found);
    let handle = listener.start(router).expect("start listener");

    let (status, body) = http_get(addr, "/echo?verbose=1");
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "path": "/echo" }));

    let (status, body) = http_get(addr, "/missing");
    assert_eq!(status, 404);
    assert_eq!(body["error"], "no such page");
    assert_eq!(body["path"], "/missing");

    assert_eq!(http_status(Method::POST, addr, "/echo"), 405);

    handle.stop().expect("stop listener");
}

#[test]
fn stopped_listener_releases_its_port() {
    let listener = SocketListener::bind("release", "127.0.0.1", 0).expect("bind listener");
    let port = listener.local_addr().port();
    let handle = listener.start(Router::new()).expect("start listener");
    handle.stop().expect("stop listener");

    SocketListener::bind("again", "127.0.0.1", port).expect("port should be free again");
}
