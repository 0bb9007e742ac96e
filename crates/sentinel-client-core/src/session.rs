//! Session state machine.
//!
//! The session owns the bearer token and the identity resolved from it. All
//! state changes go through [`next_state`], and [`SessionManager`] applies the
//! durable side of a transition before committing the in-memory side, so the
//! stored token and the token in memory never disagree after a transition
//! returns.

use std::fmt;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::{AuthApiError, AuthApiTransport, LOGIN_FAILED_REASON, LoginRequest};
use crate::identity::Identity;
use crate::routing::{RouteDecision, View, gate_view};
use crate::store::TokenStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticating,
    Pending {
        token: String,
    },
    Authenticated {
        token: String,
        identity: Identity,
    },
}

impl SessionState {
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Anonymous => SessionPhase::Anonymous,
            Self::Authenticating => SessionPhase::Authenticating,
            Self::Pending { .. } => SessionPhase::Pending,
            Self::Authenticated { .. } => SessionPhase::Authenticated,
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Pending { token } | Self::Authenticated { token, .. } => Some(token.as_str()),
            Self::Anonymous | Self::Authenticating => None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Pending,
    Authenticated,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Pending => "pending",
            Self::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// A token was found in durable storage at process start.
    Restore { token: String },
    BeginLogin,
    LoginSucceeded { token: String },
    LoginFailed,
    IdentityResolved { identity: Identity },
    IdentityRejected,
    Logout,
}

impl SessionAction {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Restore { .. } => "restore",
            Self::BeginLogin => "begin_login",
            Self::LoginSucceeded { .. } => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::IdentityResolved { .. } => "identity_resolved",
            Self::IdentityRejected => "identity_rejected",
            Self::Logout => "logout",
        }
    }
}

/// What a transition requires of durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEffect {
    Keep,
    Persist,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub storage: StorageEffect,
    /// The credential was rejected by the identity lookup and discarded.
    pub rejected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal session transition: {action} from {from}")]
pub struct TransitionError {
    pub from: SessionPhase,
    pub action: &'static str,
}

/// Pure transition function. Returns the next state and the storage effect
/// that must succeed before the next state may be committed.
pub fn next_state(
    state: &SessionState,
    action: SessionAction,
) -> Result<(SessionState, StorageEffect), TransitionError> {
    let illegal = |action: &SessionAction| TransitionError {
        from: state.phase(),
        action: action.name(),
    };

    match (state, action) {
        (SessionState::Anonymous, SessionAction::Restore { token }) => {
            Ok((SessionState::Pending { token }, StorageEffect::Keep))
        }
        (SessionState::Anonymous, SessionAction::BeginLogin) => {
            Ok((SessionState::Authenticating, StorageEffect::Keep))
        }
        (SessionState::Authenticating, SessionAction::LoginSucceeded { token }) => {
            Ok((SessionState::Pending { token }, StorageEffect::Persist))
        }
        (SessionState::Authenticating, SessionAction::LoginFailed) => {
            Ok((SessionState::Anonymous, StorageEffect::Keep))
        }
        (SessionState::Pending { token }, SessionAction::IdentityResolved { identity }) => Ok((
            SessionState::Authenticated {
                token: token.clone(),
                identity,
            },
            StorageEffect::Keep,
        )),
        (SessionState::Pending { .. }, SessionAction::IdentityRejected) => {
            Ok((SessionState::Anonymous, StorageEffect::Clear))
        }
        (SessionState::Anonymous, SessionAction::Logout) => {
            Ok((SessionState::Anonymous, StorageEffect::Keep))
        }
        (_, SessionAction::Logout) => Ok((SessionState::Anonymous, StorageEffect::Clear)),
        (_, action) => Err(illegal(&action)),
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("login is not allowed while the session is {phase}")]
    LoginNotAllowed { phase: SessionPhase },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("token store failed: {message}")]
    Store { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Failure { reason: String },
}

impl LoginOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResolution {
    Resolved,
    Rejected { error: AuthApiError },
    /// No credential awaiting resolution; no call was made.
    NotPending,
}

/// Owns the session state, the durable token slot, and the API transport.
pub struct SessionManager<S, T> {
    store: S,
    transport: T,
    state: SessionState,
}

impl<S, T> SessionManager<S, T>
where
    S: TokenStore,
    T: AuthApiTransport,
{
    /// Creates an anonymous session. Call [`Self::boot`] (or
    /// [`Self::restore`]) to pick up a previously stored token.
    pub fn new(store: S, transport: T) -> Self {
        Self {
            store,
            transport,
            state: SessionState::Anonymous,
        }
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.state.token()
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.state.token().is_some()
    }

    #[must_use]
    pub fn current_identity(&self) -> Option<&Identity> {
        self.state.identity()
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn route(&self, path: &str) -> RouteDecision {
        gate_view(View::from_path(path), self.has_credential())
    }

    /// Reads the durable slot once and enters `Pending` when it holds a token.
    pub fn restore(&mut self) -> Result<SessionPhase, SessionError> {
        if self.state != SessionState::Anonymous {
            return Ok(self.phase());
        }
        let stored = self.store.load_token().map_err(|error| SessionError::Store {
            message: error.to_string(),
        })?;
        if let Some(token) = stored {
            self.transition(SessionAction::Restore { token })?;
        }
        Ok(self.phase())
    }

    /// Restores a stored token and resolves its identity before any
    /// protected view is rendered.
    pub async fn boot(&mut self) -> Result<SessionPhase, SessionError> {
        if self.restore()? == SessionPhase::Pending {
            self.resolve_identity().await?;
        }
        Ok(self.phase())
    }

    /// Exchanges credentials for a token. Expected rejections come back as
    /// [`LoginOutcome::Failure`]; errors are reserved for misuse and storage
    /// failures.
    pub async fn login(&mut self, request: &LoginRequest) -> Result<LoginOutcome, SessionError> {
        if self.state != SessionState::Anonymous {
            return Err(SessionError::LoginNotAllowed {
                phase: self.phase(),
            });
        }
        self.transition(SessionAction::BeginLogin)?;

        let token = match self.transport.exchange_credentials(request).await {
            Ok(response) => {
                let token = response.access_token.trim().to_string();
                if token.is_empty() {
                    warn!(username = %request.username, "login exchange returned an empty token");
                    self.transition(SessionAction::LoginFailed)?;
                    return Ok(LoginOutcome::Failure {
                        reason: LOGIN_FAILED_REASON.to_string(),
                    });
                }
                token
            }
            Err(error) => {
                warn!(username = %request.username, reason = %error, "login exchange rejected");
                self.transition(SessionAction::LoginFailed)?;
                return Ok(LoginOutcome::Failure {
                    reason: error.failure_reason(),
                });
            }
        };

        if let Err(store_error) = self.transition(SessionAction::LoginSucceeded { token }) {
            self.transition(SessionAction::LoginFailed)?;
            return Err(store_error);
        }
        info!(username = %request.username, "login exchange succeeded");
        Ok(LoginOutcome::Success)
    }

    /// Resolves the identity behind a pending token. Any lookup failure
    /// discards the token from memory and from durable storage.
    pub async fn resolve_identity(&mut self) -> Result<IdentityResolution, SessionError> {
        let SessionState::Pending { token } = &self.state else {
            return Ok(IdentityResolution::NotPending);
        };
        let token = token.clone();

        match self.transport.fetch_identity(&token).await {
            Ok(identity) => {
                self.transition(SessionAction::IdentityResolved { identity })?;
                Ok(IdentityResolution::Resolved)
            }
            Err(error) => {
                warn!(reason = %error, "identity lookup rejected stored token");
                self.transition(SessionAction::IdentityRejected)?;
                Ok(IdentityResolution::Rejected { error })
            }
        }
    }

    /// Drops the token and identity. No network call; calling it while
    /// anonymous is a no-op. When the durable slot cannot be cleared the
    /// session keeps its credential and the store error is returned, so the
    /// in-memory and stored token never diverge.
    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.transition(SessionAction::Logout)
            .map(|_| ())
            .inspect_err(|store_error| {
                error!(reason = %store_error, "failed to clear stored token on logout");
            })
    }

    fn transition(&mut self, action: SessionAction) -> Result<Transition, SessionError> {
        let from = self.phase();
        let action_name = action.name();
        let rejected = matches!(action, SessionAction::IdentityRejected);
        let (next, storage) = next_state(&self.state, action)?;

        match storage {
            StorageEffect::Keep => {}
            StorageEffect::Persist => {
                if let Some(token) = next.token() {
                    self.store
                        .persist_token(token)
                        .map_err(|error| SessionError::Store {
                            message: error.to_string(),
                        })?;
                }
            }
            StorageEffect::Clear => {
                self.store
                    .clear_token()
                    .map_err(|error| SessionError::Store {
                        message: error.to_string(),
                    })?;
            }
        }

        self.state = next;
        let transition = Transition {
            from,
            to: self.phase(),
            storage,
            rejected,
        };
        if from != transition.to {
            info!(
                action = action_name,
                from = %transition.from,
                to = %transition.to,
                rejected = transition.rejected,
                "session transition"
            );
        }
        Ok(transition)
    }
}
