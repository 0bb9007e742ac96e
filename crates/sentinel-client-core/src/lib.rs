//! Client session core for the SentinelStack console.

pub mod auth;
pub mod identity;
pub mod routing;
pub mod session;
pub mod store;

pub use auth::{
    AuthApiError, AuthApiTransport, AuthInputError, LoginRequest, LoginResponse,
    normalize_base_url,
};
pub use identity::Identity;
pub use routing::{RouteDecision, View, gate_view};
pub use session::{
    IdentityResolution, LoginOutcome, SessionError, SessionManager, SessionPhase, SessionState,
};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
