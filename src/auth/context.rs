//! User context for request-scoped identity.

use crate::types::{IdentityProvider, UserId};
use serde::{Deserialize, Serialize};

/// Resolved session extracted from the HTTP request.
///
/// This is the opaque principal reference handed to the tenant access gate.
/// It only says *who* is calling; team and role are looked up by the gate on
/// every request. It is immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Key of the user record
    user_id: UserId,
    /// Email from the session, if the provider supplied one
    email: Option<String>,
    /// Identity provider that authenticated this user
    provider: IdentityProvider,
    /// Client IP address (for audit logging)
    ip_address: Option<String>,
    /// Client user agent (for audit logging)
    user_agent: Option<String>,
}

impl UserContext {
    pub fn new(user_id: UserId, email: Option<String>, provider: IdentityProvider) -> Self {
        Self {
            user_id,
            email,
            provider,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Session context for a user authenticated by a session token.
    pub fn session(user_id: impl Into<UserId>, email: Option<String>) -> Self {
        Self::new(user_id.into(), email, IdentityProvider::new("session"))
    }

    /// Set client metadata for audit logging.
    pub fn with_client_info(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn provider(&self) -> &IdentityProvider {
        &self.provider
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}
