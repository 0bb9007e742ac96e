use serde::{Deserialize, Serialize};

const FALLBACK_DISPLAY_NAME: &str = "User";
const FALLBACK_INITIAL: char = 'U';

/// Profile returned by `GET /users/me`.
///
/// Only `username` is interpreted; every other field the server sends is kept
/// verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    #[must_use]
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME)
    }

    #[must_use]
    pub fn avatar_initial(&self) -> char {
        self.username
            .as_deref()
            .and_then(|name| name.trim().chars().next())
            .and_then(|first| first.to_uppercase().next())
            .unwrap_or(FALLBACK_INITIAL)
    }
}
