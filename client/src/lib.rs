//! HTTP client for the campus backend.
//!
//! [`ApiClient`] attaches the session's bearer token to every request and
//! recovers transparently from expired-access-token failures by deferring to
//! the session manager in `campus-login`. Domain endpoints are consumed
//! through the generic JSON surface; only the credential endpoints get typed
//! wrappers, because the session lifecycle starts and ends with them.

mod auth;
mod client;
mod error;
mod types;

pub use client::ApiClient;
pub use error::ClientError;
pub use types::LoginRequest;
pub use types::RegisterOutcome;
pub use types::RegisterRequest;
pub use types::TokenResponse;
pub use types::UserProfile;
