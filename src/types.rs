//! NewType wrappers for strong typing throughout the CRM.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a team slug where a team key is expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Stable key of a user record.
    ///
    /// This is the `sub` claim of a session token and the value stored in
    /// ownership attributes such as `lead.assigned_to`.
    UserId
);

newtype_string!(
    /// Stable key of a team record.
    ///
    /// Every team-owned CRM record stores this value in its `team_id` field.
    TeamId
);

newtype_string!(
    /// Human-readable, unique team slug (e.g. "ledger1", "acme").
    ///
    /// The slug of the internal operator team is what global admin
    /// membership is decided on.
    TeamSlug
);

newtype_string!(
    /// Key of a team-owned CRM record (lead, account, invoice, ...).
    EntityKey
);

newtype_string!(
    /// Identity provider that authenticated the user.
    ///
    /// Common values: "session", "api_key".
    IdentityProvider
);

newtype_string!(
    /// SHA-256 hash of an API key for secure storage and lookup.
    ///
    /// API keys are never stored in plain text. Instead, they are hashed
    /// using SHA-256 and stored/compared using this hash.
    ApiKeyHash
);

newtype_string!(
    /// Display prefix of an API key (e.g., "lc_abc12345").
    ///
    /// The prefix can be safely displayed to users for identification
    /// purposes. It cannot be used for authentication.
    ApiKeyPrefix
);

/// Generate a fresh record key.
///
/// Keys are UUID v4 rendered without hyphens so they are valid SurrealDB
/// record id keys and safe to embed in URLs.
pub fn generate_key() -> String {
    Uuid::new_v4().simple().to_string()
}
