use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use sentinel_client_core::{
    AuthApiError, AuthApiTransport, AuthInputError, Identity, LoginRequest, LoginResponse,
    normalize_base_url,
};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 2;
pub const LOGIN_PATH: &str = "/auth/login";
pub const CURRENT_USER_PATH: &str = "/users/me";

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub request_attempts: usize,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    request_attempts: usize,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("api_client_invalid_base_url:{0}")]
    InvalidBaseUrl(#[from] AuthInputError),
    #[error("api_client_invalid_path")]
    InvalidPath,
    #[error("api_request_failed:{message}")]
    Request { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    #[error("api_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
}

impl ApiClientError {
    /// The `detail` field of an error body, as sent by the API on rejections.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        let Self::Http { body, .. } = self else {
            return None;
        };
        let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
        value
            .get("detail")
            .and_then(serde_json::Value::as_str)
            .and_then(|detail| non_empty_string(detail.to_string()))
    }
}

impl From<ApiClientError> for AuthApiError {
    fn from(error: ApiClientError) -> Self {
        let detail = error.detail();
        match error {
            ApiClientError::Http { status, .. } => AuthApiError::Rejected {
                status: status.as_u16(),
                detail,
            },
            ApiClientError::Decode { message } => AuthApiError::Decode { message },
            other => AuthApiError::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            request_attempts: config.request_attempts.max(1),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    /// `POST /auth/login` with a form-encoded body.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiClientError> {
        self.post_form(LOGIN_PATH, request).await
    }

    /// `GET /users/me` with the bearer token.
    pub async fn current_user(&self, access_token: &str) -> Result<Identity, ApiClientError> {
        self.get_json_authorized(CURRENT_USER_PATH, access_token)
            .await
    }

    pub async fn get_json_authorized<T>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, ApiClientError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ApiClientError::InvalidPath)?;
        let response = self
            .send_with_retry(|| {
                self.http
                    .get(url.as_str())
                    .bearer_auth(access_token)
                    .timeout(self.timeout)
            })
            .await?;
        decode_json_response(response).await
    }

    pub async fn post_form<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, ApiClientError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ApiClientError::InvalidPath)?;
        let response = self
            .send_with_retry(|| {
                self.http
                    .post(url.as_str())
                    .timeout(self.timeout)
                    .form(payload)
            })
            .await?;
        decode_json_response(response).await
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, ApiClientError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error: Option<String> = None;

        for attempt in 0..self.request_attempts {
            let request_id = format!("req_{}", Uuid::new_v4().simple());
            let request = build().header("x-request-id", request_id.as_str());

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    debug!(request_id = %request_id, attempt, reason = %error, "api request failed");
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.request_attempts {
                        break;
                    }
                }
            }
        }

        Err(ApiClientError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl AuthApiTransport for ApiClient {
    async fn exchange_credentials(
        &self,
        request: &LoginRequest,
    ) -> Result<LoginResponse, AuthApiError> {
        self.login(request).await.map_err(AuthApiError::from)
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, AuthApiError> {
        self.current_user(access_token)
            .await
            .map_err(AuthApiError::from)
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ApiClientError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    ApiClientError::Http { status, body }
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ApiClientError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| ApiClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ApiClientError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Form, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    async fn start_api_stub() -> (SocketAddr, JoinHandle<()>) {
        let app = Router::new()
            .route(
                "/api/auth/login",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    let username = form.get("username").cloned().unwrap_or_default();
                    let password = form.get("password").cloned().unwrap_or_default();
                    if username == "admin" && password == "admin123" {
                        (
                            axum::http::StatusCode::OK,
                            Json(json!({"access_token": "tok-admin", "token_type": "bearer"})),
                        )
                    } else if username == "crash" {
                        (
                            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({"error": "boom"})),
                        )
                    } else {
                        (
                            axum::http::StatusCode::UNAUTHORIZED,
                            Json(json!({"detail": "Invalid credentials"})),
                        )
                    }
                }),
            )
            .route(
                "/api/users/me",
                get(|headers: HeaderMap| async move {
                    let authorization = headers
                        .get("authorization")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    match authorization.as_str() {
                        "Bearer tok-admin" => (
                            axum::http::StatusCode::OK,
                            Json(json!({"username": "admin", "role": "operator"})),
                        ),
                        "Bearer abc123" => (
                            axum::http::StatusCode::FORBIDDEN,
                            Json(json!({"detail": "Not authenticated"})),
                        ),
                        _ => (
                            axum::http::StatusCode::UNAUTHORIZED,
                            Json(json!({"detail": "Could not validate credentials"})),
                        ),
                    }
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind api stub");
        let addr = listener.local_addr().expect("api stub addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .expect("api stub server failed");
        });
        (addr, handle)
    }

    fn client_for(addr: SocketAddr) -> ApiClient {
        ApiClient::new(ApiClientConfig::new(format!("http://{addr}/api/"))).expect("api client")
    }

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let client = ApiClient::new(ApiClientConfig::new("https://ops.example.com/api/"))
            .expect("api client");

        assert_eq!(
            client.endpoint(LOGIN_PATH),
            Some("https://ops.example.com/api/auth/login".to_string())
        );
        assert_eq!(
            client.endpoint("users/me"),
            Some("https://ops.example.com/api/users/me".to_string())
        );
        assert_eq!(client.endpoint(" "), None);
    }

    #[test]
    fn http_error_mapping_preserves_shape_and_detail() {
        let error = format_http_error(StatusCode::UNAUTHORIZED, br#"{"detail":"Invalid credentials"}"#);
        assert_eq!(error.detail().as_deref(), Some("Invalid credentials"));
        assert_eq!(
            AuthApiError::from(error),
            AuthApiError::Rejected {
                status: 401,
                detail: Some("Invalid credentials".to_string())
            }
        );

        let empty_body = format_http_error(StatusCode::SERVICE_UNAVAILABLE, b" ");
        assert_eq!(
            empty_body.to_string(),
            "api_http_503 Service Unavailable:<empty>"
        );
        assert_eq!(empty_body.detail(), None);
    }

    #[test]
    fn non_string_detail_is_ignored() {
        let error = format_http_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            br#"{"detail":[{"loc":["body","username"],"msg":"field required"}]}"#,
        );
        assert_eq!(error.detail(), None);
        assert_eq!(
            AuthApiError::from(error).failure_reason(),
            sentinel_client_core::auth::LOGIN_FAILED_REASON
        );
    }

    #[test]
    fn base_url_needs_scheme_and_host() {
        let result = ApiClient::new(ApiClientConfig::new("   "));
        assert!(matches!(
            result,
            Err(ApiClientError::InvalidBaseUrl(AuthInputError::EmptyBaseUrl))
        ));

        for base_url in ["ops.example.com/api", "https:///api", "ftp://ops.example.com"] {
            let result = ApiClient::new(ApiClientConfig::new(base_url));
            assert!(
                matches!(
                    result,
                    Err(ApiClientError::InvalidBaseUrl(AuthInputError::InvalidBaseUrl))
                ),
                "{base_url} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn login_exchanges_form_credentials_for_token() {
        let (addr, handle) = start_api_stub().await;
        let client = client_for(addr);

        let request = LoginRequest::new("admin", "admin123").expect("request");
        let response = client.login(&request).await.expect("login succeeds");
        assert_eq!(response.access_token, "tok-admin");
        assert_eq!(response.token_type.as_deref(), Some("bearer"));

        let bad = LoginRequest::new("admin", "nope").expect("request");
        let error = client
            .exchange_credentials(&bad)
            .await
            .expect_err("login rejected");
        assert_eq!(error.failure_reason(), "Invalid credentials");

        let crash = LoginRequest::new("crash", "x").expect("request");
        let error = client
            .exchange_credentials(&crash)
            .await
            .expect_err("server error");
        assert_eq!(
            error,
            AuthApiError::Rejected {
                status: 500,
                detail: None
            }
        );
        handle.abort();
    }

    #[tokio::test]
    async fn identity_lookup_sends_bearer_token() {
        let (addr, handle) = start_api_stub().await;
        let client = client_for(addr);

        let identity = client
            .fetch_identity("tok-admin")
            .await
            .expect("identity resolves");
        assert_eq!(identity.username.as_deref(), Some("admin"));
        assert_eq!(identity.extra.get("role"), Some(&json!("operator")));

        let error = client
            .fetch_identity("abc123")
            .await
            .expect_err("forbidden token");
        assert!(matches!(error, AuthApiError::Rejected { status: 403, .. }));
        handle.abort();
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut config = ApiClientConfig::new(format!("http://{addr}/api"));
        config.request_attempts = 1;
        let client = ApiClient::new(config).expect("api client");
        let error = client
            .fetch_identity("tok-admin")
            .await
            .expect_err("connection refused");
        assert!(matches!(error, AuthApiError::Transport { .. }));
    }
}
