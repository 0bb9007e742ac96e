use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const ENV_API_BASE_URL: &str = "SENTINEL_API_BASE_URL";
pub const LOGIN_FAILED_REASON: &str = "Login failed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthInputError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("password must not be empty")]
    EmptyPassword,
}

/// Form fields submitted to the login exchange.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    /// Builds a login submission. Both fields must be non-empty; the username
    /// is trimmed, the password is taken verbatim.
    pub fn new(username: &str, password: &str) -> Result<Self, AuthInputError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthInputError::EmptyUsername);
        }
        if password.is_empty() {
            return Err(AuthInputError::EmptyPassword);
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthApiError {
    #[error("auth_http_{status}:{}", .detail.as_deref().unwrap_or("<none>"))]
    Rejected { status: u16, detail: Option<String> },
    #[error("auth_request_failed:{message}")]
    Transport { message: String },
    #[error("auth_decode_failed:{message}")]
    Decode { message: String },
}

impl AuthApiError {
    /// Server-provided rejection detail, when the response carried one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected {
                detail: Some(detail),
                ..
            } => Some(detail.as_str()),
            _ => None,
        }
    }

    /// Human-readable reason shown next to the login form.
    #[must_use]
    pub fn failure_reason(&self) -> String {
        self.detail()
            .map(str::trim)
            .filter(|detail| !detail.is_empty())
            .unwrap_or(LOGIN_FAILED_REASON)
            .to_string()
    }
}

/// The two calls the session core makes against the API.
#[async_trait]
pub trait AuthApiTransport: Send + Sync {
    async fn exchange_credentials(
        &self,
        request: &LoginRequest,
    ) -> Result<LoginResponse, AuthApiError>;
    async fn fetch_identity(&self, access_token: &str) -> Result<Identity, AuthApiError>;
}

pub fn normalize_base_url(raw: &str) -> Result<String, AuthInputError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthInputError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(AuthInputError::InvalidBaseUrl);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_trims_and_drops_trailing_slash() {
        let normalized =
            normalize_base_url(" https://sentinel.example.com/api/ ").expect("valid base url");
        assert_eq!(normalized, "https://sentinel.example.com/api");
    }

    #[test]
    fn normalize_base_url_requires_http_scheme_and_host() {
        let error = normalize_base_url("sentinel.example.com").expect_err("expected invalid url");
        assert_eq!(error, AuthInputError::InvalidBaseUrl);
        let error = normalize_base_url("https:///api").expect_err("expected missing host");
        assert_eq!(error, AuthInputError::InvalidBaseUrl);
        let error = normalize_base_url("  ").expect_err("expected empty url");
        assert_eq!(error, AuthInputError::EmptyBaseUrl);
    }

    #[test]
    fn login_request_requires_both_fields() {
        assert_eq!(
            LoginRequest::new("  ", "secret").expect_err("empty username"),
            AuthInputError::EmptyUsername
        );
        assert_eq!(
            LoginRequest::new("admin", "").expect_err("empty password"),
            AuthInputError::EmptyPassword
        );
        let request = LoginRequest::new(" admin ", " pw ").expect("valid request");
        assert_eq!(request.username, "admin");
        assert_eq!(request.password, " pw ");
    }

    #[test]
    fn login_request_debug_redacts_password() {
        let request = LoginRequest::new("admin", "hunter2").expect("valid request");
        let rendered = format!("{request:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn failure_reason_prefers_server_detail() {
        let rejected = AuthApiError::Rejected {
            status: 401,
            detail: Some("Invalid credentials".to_string()),
        };
        assert_eq!(rejected.failure_reason(), "Invalid credentials");

        let bare = AuthApiError::Rejected {
            status: 500,
            detail: None,
        };
        assert_eq!(bare.failure_reason(), LOGIN_FAILED_REASON);

        let blank = AuthApiError::Rejected {
            status: 400,
            detail: Some("   ".to_string()),
        };
        assert_eq!(blank.failure_reason(), LOGIN_FAILED_REASON);

        let transport = AuthApiError::Transport {
            message: "connection refused".to_string(),
        };
        assert_eq!(transport.failure_reason(), LOGIN_FAILED_REASON);
    }

    #[test]
    fn api_error_display_is_stable() {
        let rejected = AuthApiError::Rejected {
            status: 403,
            detail: None,
        };
        assert_eq!(rejected.to_string(), "auth_http_403:<none>");
    }
}
