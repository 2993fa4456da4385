use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::documents::{parse_if_match, DocumentTable, Precondition, StoredDocument, WriteOutcome};
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    documents: Arc<DocumentTable>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            documents: Arc::new(DocumentTable::new()),
        }
    }

    pub fn documents(&self) -> &DocumentTable {
        &self.documents
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/docs/{*path}", get(read_document).put(write_document))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    if !tokens_match(token, &state.config.api_token) {
        return Err(AppError::unauthorized("Bearer token is not recognised"));
    }
    Ok(next.run(request).await)
}

/// Compares every byte of the expected token, whatever the first mismatch.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    let padded = presented.iter().chain(std::iter::repeat(&0));
    expected
        .iter()
        .zip(padded)
        .fold(presented.len() ^ expected.len(), |diff, (want, got)| {
            diff | usize::from(want ^ got)
        })
        == 0
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

fn validate_path(path: &str) -> Result<&str, AppError> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Err(AppError::bad_request("Document path is empty"));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(AppError::bad_request(
            "Document path segments must be non-empty and must not be `.` or `..`",
        ));
    }
    Ok(path)
}

fn header_text<'a>(
    headers: &'a HeaderMap,
    name: &header::HeaderName,
) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::bad_request(format!("{name} header is not valid UTF-8")))
        })
        .transpose()
}

fn precondition(headers: &HeaderMap) -> Result<Precondition, AppError> {
    match (
        header_text(headers, &header::IF_NONE_MATCH)?,
        header_text(headers, &header::IF_MATCH)?,
    ) {
        (Some(_), Some(_)) => Err(AppError::bad_request(
            "If-Match and If-None-Match cannot be combined",
        )),
        (Some(value), None) if value.trim() == "*" => Ok(Precondition::Absent),
        (Some(_), None) => Err(AppError::bad_request(
            "If-None-Match only supports `*` on writes",
        )),
        (None, Some(value)) => Ok(parse_if_match(value)),
        (None, None) => Err(AppError::PreconditionRequired(
            "writes need If-Match or If-None-Match: *".to_string(),
        )),
    }
}

fn document_response(status: StatusCode, document: StoredDocument) -> Response {
    (
        status,
        [(header::ETAG, document.etag())],
        Json(document.value),
    )
        .into_response()
}

async fn read_document(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let path = validate_path(&path)?;
    let document = state
        .documents
        .get(path)
        .await
        .ok_or_else(|| AppError::not_found(path))?;
    Ok(document_response(StatusCode::OK, document))
}

async fn write_document(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> Result<Response, AppError> {
    let path = validate_path(&path)?;
    let precondition = precondition(&headers)?;

    match state.documents.put(path, value, &precondition).await {
        WriteOutcome::Created(document) => {
            tracing::info!(endpoint = "docs_put", path, version = document.version, "Created document");
            Ok(document_response(StatusCode::CREATED, document))
        }
        WriteOutcome::Updated(document) => {
            tracing::info!(endpoint = "docs_put", path, version = document.version, "Updated document");
            Ok(document_response(StatusCode::OK, document))
        }
        WriteOutcome::Conflict(current) => {
            tracing::info!(
                endpoint = "docs_put",
                path,
                current_version = current.version,
                "Rejected stale write"
            );
            Ok(document_response(StatusCode::PRECONDITION_FAILED, current))
        }
        WriteOutcome::Missing => Err(AppError::not_found(path)),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    const TOKEN: &str = "test-token";

    fn router() -> Router {
        let config = Arc::new(AppConfig::new("127.0.0.1:0", TOKEN));
        app_router(AppState::from_config(config))
    }

    fn request(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let etag = response
            .headers()
            .get(header::ETAG)
            .map(|value| value.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, etag, body)
    }

    fn put(uri: &str, header: (&str, &str), body: &Value) -> Request<Body> {
        request("PUT", uri)
            .header(header.0, header.1)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn token_comparison_requires_exact_match() {
        assert!(tokens_match("secret-token", "secret-token"));
        assert!(!tokens_match("secret-tokem", "secret-token"));
        assert!(!tokens_match("secret", "secret-token"));
        assert!(!tokens_match("secret-token-extra", "secret-token"));
        assert!(!tokens_match("", "secret-token"));
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("bearer  abc "));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc");
    }

    #[test]
    fn paths_reject_traversal() {
        assert_eq!(validate_path("/profiles/a/").unwrap(), "profiles/a");
        assert!(validate_path("profiles/../secrets").is_err());
        assert!(validate_path("profiles//a").is_err());
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_i64().is_some());
    }

    #[tokio::test]
    async fn docs_require_bearer_token() {
        let router = router();
        let missing = Request::builder()
            .uri("/v1/docs/profiles/a")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, missing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("Authorization"));

        let wrong = Request::builder()
            .uri("/v1/docs/profiles/a")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&router, wrong).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_read_update_cycle() {
        let router = router();
        let uri = "/v1/docs/profiles/alice";

        let get = || request("GET", uri).body(Body::empty()).unwrap();
        assert_eq!(send(&router, get()).await.0, StatusCode::NOT_FOUND);

        let (status, etag, body) =
            send(&router, put(uri, ("if-none-match", "*"), &json!({"name": "Jane"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(etag.as_deref(), Some("\"1\""));
        assert_eq!(body, json!({"name": "Jane"}));

        let (status, etag, body) = send(&router, get()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(etag.as_deref(), Some("\"1\""));
        assert_eq!(body, json!({"name": "Jane"}));

        let (status, etag, _) =
            send(&router, put(uri, ("if-match", "\"1\""), &json!({"name": "Jane Doe"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(etag.as_deref(), Some("\"2\""));
    }

    #[tokio::test]
    async fn stale_writes_return_current_revision() {
        let router = router();
        let uri = "/v1/docs/profiles/bob";
        send(&router, put(uri, ("if-none-match", "*"), &json!({"v": 1}))).await;
        send(&router, put(uri, ("if-match", "*"), &json!({"v": 2}))).await;

        let (status, etag, body) =
            send(&router, put(uri, ("if-match", "\"1\""), &json!({"v": 3}))).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(etag.as_deref(), Some("\"2\""));
        assert_eq!(body, json!({"v": 2}));

        let (status, etag, body) =
            send(&router, put(uri, ("if-none-match", "*"), &json!({"v": 4}))).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(etag.as_deref(), Some("\"2\""));
        assert_eq!(body, json!({"v": 2}));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let (status, _, body) = send(
            &router(),
            put("/v1/docs/records/x/1", ("if-match", "*"), &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("records/x/1"));
    }

    #[tokio::test]
    async fn unconditional_write_is_rejected() {
        let request = request("PUT", "/v1/docs/profiles/a")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _, _) = send(&router(), request).await;
        assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    }

    #[tokio::test]
    async fn versions_increase_across_documents() {
        let router = router();
        send(&router, put("/v1/docs/a", ("if-none-match", "*"), &json!(1))).await;
        let (_, etag, _) = send(&router, put("/v1/docs/b", ("if-none-match", "*"), &json!(2))).await;
        assert_eq!(etag.as_deref(), Some("\"2\""));
    }
}
