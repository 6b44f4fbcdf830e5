//! HTTP implementation of the server API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use sync_types::{
    ExportPayload, FullSyncRequest, FullSyncResponse, ImportRequest, ImportResponse, PullRequest,
    PullResponse, PushRequest, PushResponse, ServerStatus,
};

use super::{ApiError, SyncApi};
use crate::auth::AuthProvider;

/// Header carrying the device id on every request.
const DEVICE_ID_HEADER: &str = "x-device-id";

/// Request timeout for all endpoints.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const FULL_SYNC_PATH: &str = "/sync/full";
const PUSH_PATH: &str = "/sync/push";
const PULL_PATH: &str = "/sync/pull";
const STATUS_PATH: &str = "/sync/status";
const EXPORT_PATH: &str = "/sync/export";
const IMPORT_PATH: &str = "/sync/import";

/// Server API over HTTPS.
///
/// Every request carries a bearer token and the device id. A 401 response
/// triggers one token refresh and one retry; a second 401 (or a failed
/// refresh) surfaces as [`ApiError::SessionExpired`].
pub struct HttpSyncApi {
    client: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpSyncApi {
    /// Create an API client for the given server base URL.
    pub fn new(base_url: &str, auth: Arc<dyn AuthProvider>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// The server base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_once<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.auth.access_token().await?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header(DEVICE_ID_HEADER, self.auth.device_id().to_string());
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(map_reqwest)
    }

    async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_once(method.clone(), path, body).await?;

        // One refresh-and-retry on 401. The refresh failing, or the retry
        // coming back 401 again, both mean the session is gone.
        let response = if response.status() == StatusCode::UNAUTHORIZED {
            self.auth
                .refresh_token()
                .await
                .map_err(|_| ApiError::SessionExpired)?;
            let retry = self.send_once(method, path, body).await?;
            if retry.status() == StatusCode::UNAUTHORIZED {
                return Err(ApiError::SessionExpired);
            }
            retry
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.map_err(map_reqwest)?;
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        response.json::<T>().await.map_err(map_reqwest)
    }
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn full_sync(&self, request: &FullSyncRequest) -> Result<FullSyncResponse, ApiError> {
        self.request(Method::POST, FULL_SYNC_PATH, Some(request))
            .await
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse, ApiError> {
        self.request(Method::POST, PUSH_PATH, Some(request)).await
    }

    async fn pull(&self, request: &PullRequest) -> Result<PullResponse, ApiError> {
        self.request(Method::POST, PULL_PATH, Some(request)).await
    }

    async fn status(&self) -> Result<ServerStatus, ApiError> {
        self.request(Method::GET, STATUS_PATH, None::<&()>).await
    }

    async fn export(&self) -> Result<ExportPayload, ApiError> {
        self.request(Method::GET, EXPORT_PATH, None::<&()>).await
    }

    async fn import(&self, request: &ImportRequest) -> Result<ImportResponse, ApiError> {
        self.request(Method::POST, IMPORT_PATH, Some(request)).await
    }
}

fn map_reqwest(error: reqwest::Error) -> ApiError {
    if error.is_decode() {
        ApiError::Decode(error.to_string())
    } else {
        ApiError::Network(error.to_string())
    }
}

/// Extract a human-readable message from an error response body.
///
/// The server answers errors as `{"error": label, "message": detail}`,
/// with the generic label in `error` and the useful detail in `message`,
/// so `message` wins when both are present. Anything else falls back to
/// the raw body text.
fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "unknown server error".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockAuth;
    use std::sync::Mutex;
    use sync_types::DeviceId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // ===========================================
    // Construction
    // ===========================================

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let auth = Arc::new(MockAuth::new());
        let api = HttpSyncApi::new("https://api.jobdeck.app/", auth).unwrap();
        assert_eq!(api.base_url(), "https://api.jobdeck.app");

        let auth = Arc::new(crate::auth::StaticAuth::new(DeviceId::random(), None));
        let api = HttpSyncApi::new("https://api.jobdeck.app", auth).unwrap();
        assert_eq!(api.base_url(), "https://api.jobdeck.app");
    }

    // ===========================================
    // Error Bodies
    // ===========================================

    #[test]
    fn error_message_prefers_detail_over_label() {
        let body = br#"{"error": "Sync push failed", "message": "queue too large"}"#;
        assert_eq!(error_message(body), "queue too large");
    }

    #[test]
    fn error_message_falls_back_to_error_label() {
        let body = br#"{"error": "Sync push failed"}"#;
        assert_eq!(error_message(body), "Sync push failed");

        let body = br#"{"message": "validation failed"}"#;
        assert_eq!(error_message(body), "validation failed");
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message(b"Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(b""), "unknown server error");
        assert_eq!(error_message(br#"{"code": 42}"#), r#"{"code": 42}"#);
    }

    // ===========================================
    // Refresh and Retry
    // ===========================================

    /// Serves one canned response per connection, with `connection: close`
    /// so a retried request always arrives as a fresh accept. Records the
    /// head of every request it sees.
    struct StubServer {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn serve(responses: Vec<(u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&requests);

            tokio::spawn(async move {
                for (status, body) in responses {
                    let (mut stream, _) = match listener.accept().await {
                        Ok(accepted) => accepted,
                        Err(_) => return,
                    };

                    // The endpoints under test are GETs, so the request
                    // ends at the header terminator.
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    log.lock()
                        .unwrap()
                        .push(String::from_utf8_lossy(&head).into_owned());

                    let reason = if status == 401 { "Unauthorized" } else { "OK" };
                    let response = format!(
                        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });

            Self { base_url, requests }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        /// The bearer token of each request, in arrival order.
        fn bearer_tokens(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter_map(|head| {
                    head.lines().find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if !name.eq_ignore_ascii_case("authorization") {
                            return None;
                        }
                        value.trim().strip_prefix("Bearer ").map(str::to_string)
                    })
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn retries_once_with_a_fresh_token_after_a_401() {
        let server = StubServer::serve(vec![
            (401, r#"{"error": "Unauthorized"}"#),
            (200, r#"{"success": true}"#),
        ])
        .await;
        let auth = MockAuth::logged_in("stale-token");
        let api = HttpSyncApi::new(&server.base_url, Arc::new(auth.clone())).unwrap();

        let status = api.status().await.unwrap();

        assert!(status.success);
        assert_eq!(auth.refresh_count(), 1);
        assert_eq!(
            server.bearer_tokens(),
            vec!["stale-token".to_string(), "stale-token-r1".to_string()]
        );
    }

    #[tokio::test]
    async fn second_401_after_refresh_expires_the_session() {
        let server = StubServer::serve(vec![
            (401, r#"{"error": "Unauthorized"}"#),
            (401, r#"{"error": "Unauthorized"}"#),
        ])
        .await;
        let auth = MockAuth::logged_in("stale-token");
        let api = HttpSyncApi::new(&server.base_url, Arc::new(auth.clone())).unwrap();

        let result = api.status().await;

        assert!(matches!(result, Err(ApiError::SessionExpired)));
        assert_eq!(auth.refresh_count(), 1);
        // The original request and one retry, nothing after the second 401.
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_expires_the_session_without_retrying() {
        let server = StubServer::serve(vec![(401, r#"{"error": "Unauthorized"}"#)]).await;
        let auth = MockAuth::logged_in("stale-token");
        auth.fail_next_refresh("refresh token revoked");
        let api = HttpSyncApi::new(&server.base_url, Arc::new(auth.clone())).unwrap();

        let result = api.status().await;

        assert!(matches!(result, Err(ApiError::SessionExpired)));
        assert_eq!(auth.refresh_count(), 0);
        assert_eq!(server.request_count(), 1);
    }
}
