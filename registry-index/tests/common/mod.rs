//! Common test utilities and helpers
//!
//! Shared setup for the HTTP-level tests: an in-memory index behind the real
//! router, and a throwaway upstream index served on a local port.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query},
    routing::get,
    Json, Router,
};
use axum_test::TestServer;
use registry_index::config::Config;
use registry_index::{api, AppState, MemoryStore, UpstreamClient, UpstreamConfig, UpstreamSource};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Test setup result
pub struct TestSetup {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

/// Upstream request timeout used by [`create_test_setup`].
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds the index router over an in-memory store.
///
/// `mirror` is the base URL of an upstream index to mirror, if any.
pub async fn create_test_setup(mirror: Option<&str>) -> TestSetup {
    create_test_setup_with_timeout(mirror, UPSTREAM_TIMEOUT).await
}

/// Same as [`create_test_setup`] with a custom upstream timeout.
pub async fn create_test_setup_with_timeout(
    mirror: Option<&str>,
    timeout: Duration,
) -> TestSetup {
    let mut config = Config::default();
    config.storage.backend = "memory".to_string();
    config.search.backend = "memory".to_string();
    config.server.endpoints = Some("registry.test:5000".to_string());

    let store = Arc::new(MemoryStore::new());
    let upstream = mirror.map(|source_index| {
        let client = UpstreamClient::new(UpstreamConfig {
            source_index: source_index.to_string(),
            timeout,
            enabled: true,
        })
        .expect("Failed to create upstream client");
        Arc::new(client) as Arc<dyn UpstreamSource>
    });

    let state = Arc::new(
        AppState::build(config, store.clone(), upstream)
            .await
            .expect("Failed to build app state"),
    );
    let server =
        TestServer::new(api::router(state.clone())).expect("Failed to create test server");

    TestSetup {
        server,
        state,
        store,
    }
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

/// Serves a fake upstream index on 127.0.0.1 and returns its base URL.
///
/// Search always answers `acme/web` and `other/tool`; every repository has a
/// single image `upstream-image`.
pub async fn spawn_upstream_index() -> String {
    let app = Router::new()
        .route(
            "/v1/search",
            get(|Query(params): Query<SearchParams>| async move {
                let results = vec![
                    json!({"name": "acme/web", "description": "from upstream"}),
                    json!({"name": "other/tool", "description": "from upstream", "star_count": 4}),
                ];
                Json(json!({
                    "query": params.q.unwrap_or_default(),
                    "num_results": results.len(),
                    "results": results,
                }))
            }),
        )
        .route(
            "/v1/repositories/{namespace}/{name}/images",
            get(|Path((_namespace, _name)): Path<(String, String)>| async move {
                Json::<Value>(json!([{"id": "upstream-image"}]))
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind upstream listener");
    let addr = listener.local_addr().expect("Failed to read upstream address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    format!("http://{addr}")
}

/// An address nothing listens on.
pub fn unreachable_upstream() -> &'static str {
    "http://127.0.0.1:9"
}

/// Serves an upstream that accepts connections and never answers.
///
/// Returns the base URL. Accepted sockets stay open until the runtime shuts
/// down, so clients only give up through their own timeout.
pub async fn spawn_silent_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind silent upstream listener");
    let addr = listener
        .local_addr()
        .expect("Failed to read silent upstream address");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}")
}
