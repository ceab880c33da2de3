//! Authentication and user context module.
//!
//! Resolves *who* is calling. Two methods are supported:
//!
//! - **Session token**: `Authorization: Bearer <jwt>`, HS256 signed with the
//!   shared session secret. Sessions are issued elsewhere; this crate only
//!   verifies them.
//! - **API Key**: `X-API-Key` header, looked up by SHA-256 hash. The key acts
//!   as the user that owns it.
//!
//! What the caller may *see* is decided by [`crate::access`], never here.

mod context;
mod extractor;
mod user_store;

pub use context::UserContext;
pub use extractor::{
    AuthConfig, AuthError, AuthExtractor, SessionClaims, encode_session_token, generate_api_key,
    hash_api_key,
};
pub use user_store::UserStore;
