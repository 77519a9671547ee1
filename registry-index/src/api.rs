//! HTTP routes of the v1 index API.
//!
//! Repository paths follow `/v1/repositories/<namespace>/<name>[/images|/auth]`;
//! a path with a single segment lives in the `library` namespace.

use crate::error::{AppError, AppResult};
use crate::platform::PlatformTag;
use crate::state::AppState;
use crate::types::Repository;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use rand::{distr::Alphanumeric, Rng};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const X_DOCKER_ENDPOINTS: HeaderName = HeaderName::from_static("x-docker-endpoints");
const X_DOCKER_TOKEN: HeaderName = HeaderName::from_static("x-docker-token");

/// Build the index router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/_ping", get(ping))
        .route("/v1/_ping", get(ping))
        .route("/health", get(health))
        .route("/v1/users", get(get_users).post(post_users))
        .route("/v1/users/", get(get_users).post(post_users))
        .route("/v1/users/{username}/", put(put_username))
        .route(
            "/v1/repositories/{*path}",
            put(put_repository_path)
                .get(get_repository_path)
                .delete(delete_repository_path),
        )
        .route("/v1/search", get(search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// What a `/v1/repositories/...` path addresses.
#[derive(Debug, PartialEq)]
enum RepositoryRoute {
    Repository(Repository),
    Images(Repository),
    Auth(Repository),
}

impl RepositoryRoute {
    fn parse(path: &str) -> AppResult<Self> {
        let path = path.trim_matches('/');
        if let Some(repo) = path.strip_suffix("/images") {
            Ok(Self::Images(Repository::parse(repo)?))
        } else if let Some(repo) = path.strip_suffix("/auth") {
            Ok(Self::Auth(Repository::parse(repo)?))
        } else {
            Ok(Self::Repository(Repository::parse(path)?))
        }
    }
}

fn request_platform(headers: &HeaderMap) -> PlatformTag {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    PlatformTag::from_user_agent(user_agent)
}

fn random_signature() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Endpoint discovery and token headers returned on repository routes.
///
/// The token is not verifiable by a real index; it only satisfies clients
/// that expect one.
fn repository_headers(
    state: &AppState,
    request: &HeaderMap,
    repo: &Repository,
    access: &str,
) -> AppResult<HeaderMap> {
    let endpoints = match &state.config.server.endpoints {
        Some(endpoints) => endpoints.clone(),
        None => request
            .get(header::HOST)
            .and_then(|host| host.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}:{}", state.config.server.host, state.config.server.port)),
    };

    let token = format!(
        "Token signature={},repository=\"{}/{}\",access={}",
        random_signature(),
        repo.namespace,
        repo.name,
        access
    );

    let header_value = |value: &str| {
        HeaderValue::from_str(value)
            .map_err(|e| AppError::InternalError(format!("Invalid header value: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(X_DOCKER_ENDPOINTS, header_value(&endpoints)?);
    headers.insert(header::WWW_AUTHENTICATE, header_value(&token)?);
    headers.insert(X_DOCKER_TOKEN, header_value(&token)?);
    Ok(headers)
}

async fn ping() -> Json<Value> {
    Json(json!(true))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

async fn get_users() -> Json<&'static str> {
    Json("OK")
}

async fn post_users(body: Bytes) -> AppResult<Response> {
    serde_json::from_slice::<Value>(&body)
        .map_err(|_| AppError::MalformedInput("Error Decoding JSON".to_string()))?;
    Ok((StatusCode::CREATED, Json("User Created")).into_response())
}

async fn put_username(Path(username): Path<String>) -> StatusCode {
    debug!(username = %username, "Accepted user update");
    StatusCode::NO_CONTENT
}

async fn put_repository_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let (repo, status) = match RepositoryRoute::parse(&path)? {
        RepositoryRoute::Auth(_) => return Ok(Json("OK").into_response()),
        RepositoryRoute::Repository(repo) => (repo, StatusCode::OK),
        RepositoryRoute::Images(repo) => (repo, StatusCode::NO_CONTENT),
    };

    let platform = request_platform(&headers);
    let update = state
        .merger
        .update_index_images(&repo, &body, platform)
        .await?;
    info!(
        repository = %repo,
        event = update.kind.as_str(),
        platform = %update.platform,
        "Image list pushed"
    );

    let response_headers = repository_headers(&state, &headers, &repo, "write")?;
    if status == StatusCode::NO_CONTENT {
        return Ok((status, response_headers).into_response());
    }
    Ok((status, response_headers, Json("")).into_response())
}

async fn get_repository_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let RepositoryRoute::Images(repo) = RepositoryRoute::parse(&path)? else {
        return Err(AppError::NotFound("Not Found".to_string()));
    };

    let platform = request_platform(&headers);
    let content = state
        .retriever
        .get_repository_images(&repo, &platform)
        .await?;

    let mut response_headers = repository_headers(&state, &headers, &repo, "read")?;
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok((StatusCode::OK, response_headers, content).into_response())
}

/// The image list is removed together with the repository, so this only
/// acknowledges the request.
async fn delete_repository_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let RepositoryRoute::Images(repo) = RepositoryRoute::parse(&path)? else {
        return Err(AppError::NotFound("Not Found".to_string()));
    };

    let response_headers = repository_headers(&state, &headers, &repo, "delete")?;
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let term = params.q.unwrap_or_default();
    let platform = request_platform(&headers);
    let response = state.search.search(&term, &platform).await?;
    Ok(Json(response).into_response())
}
