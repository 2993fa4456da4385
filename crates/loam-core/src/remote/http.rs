//! HTTP remote client speaking the `ETag` / `If-Match` document contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Method, StatusCode};
use serde::Deserialize;

use super::{RemoteClient, RemoteError, RemoteResult, SessionProvider};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{Value, VersionToken, VersionedRecord};
use crate::util::compact_text;

/// Remote document service reached over HTTP.
#[derive(Clone)]
pub struct HttpRemoteClient {
    config: RemoteConfig,
    session: Arc<dyn SessionProvider>,
    client: reqwest::Client,
}

impl fmt::Debug for HttpRemoteClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpRemoteClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.session.is_authenticated())
            .finish_non_exhaustive()
    }
}

enum Precondition<'a> {
    Absent,
    Matches(Option<&'a VersionToken>),
}

impl HttpRemoteClient {
    pub fn new(config: RemoteConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            config,
            session,
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        precondition: Option<Precondition<'_>>,
    ) -> RemoteResult<reqwest::Response> {
        let token = self.session.bearer_token().ok_or_else(|| {
            RemoteError::Unauthenticated("no bearer token available".to_string())
        })?;

        let url = self.config.document_url(path);
        tracing::debug!(%method, %url, "remote request");

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(token)
            .header("Accept", "application/json");
        request = match precondition {
            None => request,
            Some(Precondition::Absent) => request.header(IF_NONE_MATCH, "*"),
            Some(Precondition::Matches(Some(version))) => {
                request.header(IF_MATCH, version.as_str())
            }
            Some(Precondition::Matches(None)) => request.header(IF_MATCH, "*"),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|error| RemoteError::Transient(error.to_string()))
    }

    async fn write(
        &self,
        path: &str,
        value: &Value,
        precondition: Precondition<'_>,
    ) -> RemoteResult<VersionedRecord> {
        let response = self
            .send(Method::PUT, path, Some(value), Some(precondition))
            .await?;
        let status = response.status();
        if status.is_success() {
            return into_record(response).await;
        }
        if is_conflict(status) {
            let current = match conflict_record(response).await {
                Some(current) => current,
                None => self.read(path).await?,
            };
            return Err(RemoteError::conflict(current));
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn read(&self, path: &str) -> RemoteResult<VersionedRecord> {
        let response = self.send(Method::GET, path, None, None).await?;
        let status = response.status();
        if status.is_success() {
            return into_record(response).await;
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    async fn create(&self, path: &str, value: &Value) -> RemoteResult<VersionedRecord> {
        self.write(path, value, Precondition::Absent).await
    }

    async fn conditional_update(
        &self,
        path: &str,
        value: &Value,
        version: Option<&VersionToken>,
    ) -> RemoteResult<VersionedRecord> {
        self.write(path, value, Precondition::Matches(version))
            .await
    }
}

const fn is_conflict(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
    )
}

fn etag(response: &reqwest::Response) -> Option<VersionToken> {
    response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(VersionToken::new)
}

async fn into_record(response: reqwest::Response) -> RemoteResult<VersionedRecord> {
    let status = response.status();
    let version = etag(&response)
        .ok_or_else(|| RemoteError::fatal(status.as_u16(), "response is missing an ETag"))?;
    let value = response
        .json::<Value>()
        .await
        .map_err(|error| RemoteError::Transient(format!("unreadable response body: {error}")))?;
    Ok(VersionedRecord::new(value, version))
}

/// Current revision carried by a 409/412 response, if the server sent one.
async fn conflict_record(response: reqwest::Response) -> Option<VersionedRecord> {
    let version = etag(&response)?;
    let body = response.text().await.ok()?;
    if body.trim().is_empty() {
        return None;
    }
    let value = serde_json::from_str::<Value>(&body).ok()?;
    Some(VersionedRecord::new(value, version))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

/// Map a non-success, non-conflict status onto the remote error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = error_message(status, body);
    match status.as_u16() {
        401 | 403 => RemoteError::Unauthenticated(message),
        404 => RemoteError::NotFound,
        408 | 425 | 429 | 500..=599 => {
            RemoteError::Transient(format!("{message} ({})", status.as_u16()))
        }
        code => RemoteError::fatal(code, message),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::remote::StaticSession;

    struct CannedResponse {
        status: u16,
        etag: Option<&'static str>,
        body: String,
    }

    fn canned(status: u16, etag: Option<&'static str>, body: serde_json::Value) -> CannedResponse {
        CannedResponse {
            status,
            etag,
            body: if body.is_null() {
                String::new()
            } else {
                body.to_string()
            },
        }
    }

    fn reason(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            401 => "Unauthorized",
            404 => "Not Found",
            412 => "Precondition Failed",
            422 => "Unprocessable Entity",
            503 => "Service Unavailable",
            _ => "Status",
        }
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buffer);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buffer.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Serve `responses` in order, one per connection, recording each request.
    async fn start_mock_server(
        responses: Vec<CannedResponse>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let mut queue: VecDeque<CannedResponse> = responses.into();

        tokio::spawn(async move {
            while let Some(response) = queue.pop_front() {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                recorded.lock().unwrap().push(request);

                let mut head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                    response.status,
                    reason(response.status),
                    response.body.len()
                );
                if let Some(etag) = response.etag {
                    head.push_str(&format!("ETag: {etag}\r\n"));
                }
                head.push_str("\r\n");
                stream.write_all(head.as_bytes()).await.unwrap();
                stream.write_all(response.body.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (format!("http://{address}"), requests)
    }

    fn client(base_url: &str) -> HttpRemoteClient {
        HttpRemoteClient::new(
            RemoteConfig::new(base_url).unwrap(),
            Arc::new(StaticSession::new("user-1", "secret-token")),
        )
        .unwrap()
    }

    #[test]
    fn status_classification() {
        let cases = [
            (StatusCode::UNAUTHORIZED, "unauthenticated"),
            (StatusCode::FORBIDDEN, "unauthenticated"),
            (StatusCode::NOT_FOUND, "not_found"),
            (StatusCode::REQUEST_TIMEOUT, "transient"),
            (StatusCode::TOO_MANY_REQUESTS, "transient"),
            (StatusCode::BAD_GATEWAY, "transient"),
            (StatusCode::SERVICE_UNAVAILABLE, "transient"),
            (StatusCode::BAD_REQUEST, "fatal"),
            (StatusCode::UNPROCESSABLE_ENTITY, "fatal"),
        ];
        for (status, expected) in cases {
            let kind = match classify_status(status, "") {
                RemoteError::Unauthenticated(_) => "unauthenticated",
                RemoteError::NotFound => "not_found",
                RemoteError::Transient(_) => "transient",
                RemoteError::Fatal { .. } => "fatal",
                RemoteError::VersionConflict { .. } => "conflict",
            };
            assert_eq!(kind, expected, "status {status}");
        }
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        let message = error_message(StatusCode::BAD_REQUEST, r#"{"error":"payload too large"}"#);
        assert_eq!(message, "payload too large");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, "  "), "HTTP 400");
    }

    #[tokio::test]
    async fn read_returns_body_and_etag() {
        let (base_url, requests) =
            start_mock_server(vec![canned(200, Some("\"3\""), json!({"name": "Jane"}))]).await;

        let record = client(&base_url).read("contacts/c-1").await.unwrap();
        assert_eq!(record.value, Value::from(json!({"name": "Jane"})));
        assert_eq!(record.version, VersionToken::new("\"3\""));

        let request = requests.lock().unwrap()[0].clone();
        assert!(request.starts_with("GET /v1/docs/contacts/c-1 HTTP/1.1"));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn create_sends_if_none_match() {
        let (base_url, requests) =
            start_mock_server(vec![canned(201, Some("\"1\""), json!({"a": 1}))]).await;

        let record = client(&base_url)
            .create("contacts/c-1", &Value::from(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(record.version, VersionToken::new("\"1\""));

        let request = requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(request.starts_with("put /v1/docs/contacts/c-1"));
        assert!(request.contains("if-none-match: *"));
        assert!(request.ends_with(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn update_without_version_matches_any() {
        let (base_url, requests) =
            start_mock_server(vec![canned(200, Some("\"2\""), json!("v"))]).await;

        client(&base_url)
            .conditional_update("notes/n", &Value::from("v"), None)
            .await
            .unwrap();
        let request = requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(request.contains("if-match: *"));
    }

    #[tokio::test]
    async fn precondition_failure_carries_current_revision() {
        let (base_url, requests) = start_mock_server(vec![canned(
            412,
            Some("\"9\""),
            json!({"name": "Remote"}),
        )])
        .await;

        let error = client(&base_url)
            .conditional_update(
                "contacts/c-1",
                &Value::from(json!({"name": "Local"})),
                Some(&VersionToken::new("\"4\"")),
            )
            .await
            .unwrap_err();
        let RemoteError::VersionConflict { current } = error else {
            panic!("expected a version conflict, got {error:?}");
        };
        assert_eq!(current.version, VersionToken::new("\"9\""));
        assert_eq!(current.value, Value::from(json!({"name": "Remote"})));

        let request = requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(request.contains("if-match: \"4\""));
    }

    #[tokio::test]
    async fn bare_conflict_rereads_current_revision() {
        let (base_url, requests) = start_mock_server(vec![
            canned(409, None, serde_json::Value::Null),
            canned(200, Some("\"5\""), json!({"k": "v"})),
        ])
        .await;

        let error = client(&base_url)
            .create("contacts/c-1", &Value::from(json!({"k": "mine"})))
            .await
            .unwrap_err();
        let RemoteError::VersionConflict { current } = error else {
            panic!("expected a version conflict, got {error:?}");
        };
        assert_eq!(current.version, VersionToken::new("\"5\""));
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failure_statuses_are_classified() {
        let (base_url, _) = start_mock_server(vec![
            canned(404, None, json!({"error": "missing"})),
            canned(503, None, json!({"error": "maintenance"})),
            canned(401, None, json!({"error": "bad token"})),
            canned(422, None, json!({"error": "invalid"})),
        ])
        .await;
        let client = client(&base_url);

        assert!(matches!(
            client.read("a/b").await.unwrap_err(),
            RemoteError::NotFound
        ));
        assert!(matches!(
            client.read("a/b").await.unwrap_err(),
            RemoteError::Transient(message) if message.contains("maintenance")
        ));
        assert!(matches!(
            client.read("a/b").await.unwrap_err(),
            RemoteError::Unauthenticated(message) if message == "bad token"
        ));
        assert!(matches!(
            client.create("a/b", &Value::from(1)).await.unwrap_err(),
            RemoteError::Fatal { status: 422, .. }
        ));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let (base_url, requests) = start_mock_server(Vec::new()).await;
        let client = HttpRemoteClient::new(
            RemoteConfig::new(&base_url).unwrap(),
            Arc::new(StaticSession::anonymous()),
        )
        .unwrap();

        let error = client.read("a/b").await.unwrap_err();
        assert!(matches!(error, RemoteError::Unauthenticated(_)));
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let error = client(&format!("http://{address}"))
            .read("a/b")
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Transient(_)));
    }
}
