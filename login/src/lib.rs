//! Session layer for the campus client: token data model, durable token
//! storage, and the [`SessionManager`] that owns the access/refresh token
//! lifecycle.

mod session;
mod token_data;
mod token_store;

pub use session::DEFAULT_REFRESH_TIMEOUT;
pub use session::LoginRedirect;
pub use session::SessionError;
pub use session::SessionManager;
pub use token_data::ClaimsInfo;
pub use token_data::KnownRole;
pub use token_data::TokenData;
pub use token_data::UserRole;
pub use token_store::MemoryTokenStore;
pub use token_store::SessionFileStore;
pub use token_store::StoredSession;
pub use token_store::TokenStore;
pub use token_store::get_session_file;

#[cfg(test)]
mod lib_tests;
