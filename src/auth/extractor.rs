//! Session extraction for HTTP requests.

use std::fmt;
use std::sync::Arc;

use crate::auth::context::UserContext;
use crate::auth::user_store::UserStore;
use crate::db::{Db, QueryBuilder};
use crate::types::{ApiKeyHash, ApiKeyPrefix, IdentityProvider, UserId};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HS256 secret session tokens are signed with.
    /// Bearer tokens are rejected when unset.
    pub session_secret: Option<String>,
    /// Expected `iss` claim, if any
    pub session_issuer: Option<String>,
    /// Expected `aud` claim, if any
    pub session_audience: Option<String>,
    /// Header name for API key authentication
    pub api_key_header: String,
    /// Whether database-backed API keys are accepted
    pub api_keys_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_issuer: None,
            session_audience: None,
            api_key_header: "X-API-Key".to_string(),
            api_keys_enabled: true,
        }
    }
}

impl AuthConfig {
    /// Config that accepts session tokens signed with `secret`.
    pub fn with_session_secret(secret: impl Into<String>) -> Self {
        Self {
            session_secret: Some(secret.into()),
            ..Default::default()
        }
    }
}

/// Authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No credentials were presented
    Unauthenticated,
    /// Invalid API key
    InvalidApiKey,
    /// API key is expired
    ApiKeyExpired,
    /// API key is inactive/revoked
    ApiKeyRevoked,
    /// Invalid or expired session token
    InvalidToken(String),
    /// User is deactivated
    UserDeactivated,
    /// Database error
    DatabaseError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Authentication required"),
            Self::InvalidApiKey => write!(f, "Invalid API key"),
            Self::ApiKeyExpired => write!(f, "API key has expired"),
            Self::ApiKeyRevoked => write!(f, "API key has been revoked"),
            Self::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            Self::UserDeactivated => write!(f, "User account is deactivated"),
            Self::DatabaseError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the user key
    pub sub: String,
    pub email: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Turns request credentials into a [`UserContext`].
#[derive(Clone)]
pub struct AuthExtractor {
    config: AuthConfig,
    user_store: Arc<UserStore>,
    db: Db,
}

impl AuthExtractor {
    pub fn new(config: AuthConfig, db: Db) -> Self {
        Self {
            config,
            user_store: Arc::new(UserStore::new(db.clone())),
            db,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn user_store(&self) -> &Arc<UserStore> {
        &self.user_store
    }

    /// Extract the session from request headers.
    ///
    /// Checked in order: bearer session token, then API key header.
    pub async fn extract_user(
        &self,
        authorization: Option<&str>,
        api_key: Option<&str>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<UserContext, AuthError> {
        let user = if let Some(auth_header) = authorization
            && let Some(token) = auth_header.strip_prefix("Bearer ")
        {
            self.extract_from_session_token(token.trim(), ip_address, user_agent)
                .await?
        } else if let Some(key) = api_key {
            self.extract_from_api_key(key, ip_address, user_agent).await?
        } else {
            return Err(AuthError::Unauthenticated);
        };

        if let Err(e) = self.user_store.touch_last_seen(user.user_id().as_str()).await {
            warn!("Failed to update last_seen_at for {}: {}", user.user_id(), e);
        }

        Ok(user)
    }

    async fn extract_from_session_token(
        &self,
        token: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<UserContext, AuthError> {
        let secret = self.config.session_secret.as_deref().ok_or_else(|| {
            AuthError::InvalidToken("session tokens are not configured".to_string())
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &self.config.session_issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &self.config.session_audience {
            validation.set_audience(&[audience]);
        }

        let claims = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?
        .claims;

        debug!("Session token verified for subject: {}", claims.sub);

        let user = self
            .user_store
            .get_user(&claims.sub)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or_else(|| AuthError::InvalidToken("unknown subject".to_string()))?;

        if !user.is_active {
            return Err(AuthError::UserDeactivated);
        }

        let email = claims.email.or(Some(user.email));
        Ok(UserContext::session(user.key, email).with_client_info(ip_address, user_agent))
    }

    /// Extract the session from a database-backed API key.
    pub async fn extract_from_api_key(
        &self,
        key: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<UserContext, AuthError> {
        if !self.config.api_keys_enabled {
            return Err(AuthError::InvalidApiKey);
        }

        let key_hash = hash_api_key(key);
        let api_key = QueryBuilder::find_api_key_by_hash(&self.db, key_hash.as_str())
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::InvalidApiKey)?;

        if !api_key.is_active {
            return Err(AuthError::ApiKeyRevoked);
        }

        if let Some(expires_at) = &api_key.expires_at
            && expires_at.0 < chrono::Utc::now()
        {
            return Err(AuthError::ApiKeyExpired);
        }

        if let Err(e) = QueryBuilder::update_api_key_last_used(&self.db, &api_key.id).await {
            warn!("Failed to update last_used_at for {}: {}", api_key.key_prefix, e);
        }

        let user = self
            .user_store
            .get_user(&api_key.user_id)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::InvalidApiKey)?;

        if !user.is_active {
            return Err(AuthError::UserDeactivated);
        }

        Ok(UserContext::new(
            UserId::new(user.key),
            Some(user.email),
            IdentityProvider::new("api_key"),
        )
        .with_client_info(ip_address, user_agent))
    }
}

/// Sign a session token for `user_key`, valid for `ttl_seconds`.
///
/// Sessions are normally issued by the front end; this is used by the CLI
/// and tests.
pub fn encode_session_token(
    config: &AuthConfig,
    user_key: &str,
    email: Option<&str>,
    ttl_seconds: u64,
) -> anyhow::Result<String> {
    let secret = config
        .session_secret
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("auth.session_secret is not configured"))?;

    let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl_seconds;
    let claims = SessionClaims {
        sub: user_key.to_string(),
        email: email.map(str::to_string),
        exp,
        iss: config.session_issuer.clone(),
        aud: config.session_audience.clone(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Hash an API key for storage and lookup (don't store raw keys).
pub fn hash_api_key(key: &str) -> ApiKeyHash {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let result = hasher.finalize();
    ApiKeyHash::new(format!("{:x}", result))
}

/// Generate a new API key with the format: prefix_randompart
/// Returns (full_key, prefix, hash)
pub fn generate_api_key() -> (String, ApiKeyPrefix, ApiKeyHash) {
    use uuid::Uuid;

    let prefix = ApiKeyPrefix::new(format!("lc_{}", &Uuid::new_v4().simple().to_string()[..8]));
    let secret = Uuid::new_v4().simple().to_string();
    let full_key = format!("{}_{}", prefix, secret);
    let key_hash = hash_api_key(&full_key);

    (full_key, prefix, key_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{ApiKeyCreate, UserCreate};
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use surrealdb::sql::Datetime;

    const SECRET: &str = "test-secret";

    async fn setup() -> (AuthExtractor, String) {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        let extractor = AuthExtractor::new(AuthConfig::with_session_secret(SECRET), db);
        let user = extractor
            .user_store()
            .create_user(&UserCreate {
                email: "rep@example.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (extractor, user.key)
    }

    async fn store_key(extractor: &AuthExtractor, user_key: &str, expires_at: Option<Datetime>) -> String {
        let (full_key, prefix, hash) = generate_api_key();
        QueryBuilder::create_api_key(
            &extractor.db,
            &ApiKeyCreate {
                key_hash: hash,
                key_prefix: prefix,
                user_id: user_key.to_string(),
                name: Some("integration".to_string()),
                expires_at,
            },
        )
        .await
        .unwrap();
        full_key
    }

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(config.session_secret.is_none());
        assert_eq!(config.api_key_header, "X-API-Key");
        assert!(config.api_keys_enabled);
    }

    #[test]
    fn test_hash_api_key() {
        let hash1 = hash_api_key("secret123");
        let hash2 = hash_api_key("secret123");
        let hash3 = hash_api_key("different");

        assert!(hash1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_generate_api_key() {
        let (full_key, prefix, hash) = generate_api_key();

        assert!(full_key.starts_with("lc_"));
        assert!(full_key.starts_with(prefix.as_str()));
        assert_eq!(hash, hash_api_key(&full_key));
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::Unauthenticated.to_string(), "Authentication required");
        assert_eq!(AuthError::ApiKeyRevoked.to_string(), "API key has been revoked");
        assert_eq!(
            AuthError::InvalidToken("bad".to_string()).to_string(),
            "Invalid token: bad"
        );
    }

    #[tokio::test]
    async fn test_no_credentials_is_unauthenticated() {
        let (extractor, _) = setup().await;
        let result = extractor.extract_user(None, None, None, None).await;
        assert!(matches!(result.unwrap_err(), AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_session_token_round_trip() {
        let (extractor, user_key) = setup().await;
        let token =
            encode_session_token(extractor.config(), &user_key, Some("rep@example.com"), 600)
                .unwrap();

        let header = format!("Bearer {}", token);
        let ctx = extractor
            .extract_user(Some(&header), None, Some("10.0.0.1".to_string()), None)
            .await
            .unwrap();

        assert_eq!(ctx.user_id().as_str(), user_key);
        assert_eq!(ctx.provider().as_str(), "session");
        assert_eq!(ctx.ip_address(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_successful_authentication_records_last_seen() {
        let (extractor, user_key) = setup().await;
        let before = extractor.user_store().get_user(&user_key).await.unwrap().unwrap();
        assert!(before.last_seen_at.is_none());

        let key = store_key(&extractor, &user_key, None).await;
        extractor.extract_user(None, Some(&key), None, None).await.unwrap();

        let after = extractor.user_store().get_user(&user_key).await.unwrap().unwrap();
        assert!(after.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_is_rejected() {
        let (extractor, user_key) = setup().await;
        let other = AuthConfig::with_session_secret("another-secret");
        let token = encode_session_token(&other, &user_key, None, 600).unwrap();

        let header = format!("Bearer {}", token);
        let result = extractor.extract_user(Some(&header), None, None, None).await;
        assert!(matches!(result.unwrap_err(), AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_is_rejected() {
        let (extractor, _) = setup().await;
        let token = encode_session_token(extractor.config(), "ghost", None, 600).unwrap();

        let header = format!("Bearer {}", token);
        let result = extractor.extract_user(Some(&header), None, None, None).await;
        assert!(matches!(result.unwrap_err(), AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_deactivated_user_is_rejected() {
        let (extractor, user_key) = setup().await;
        extractor.user_store().deactivate_user(&user_key).await.unwrap();
        let token = encode_session_token(extractor.config(), &user_key, None, 600).unwrap();

        let header = format!("Bearer {}", token);
        let result = extractor.extract_user(Some(&header), None, None, None).await;
        assert!(matches!(result.unwrap_err(), AuthError::UserDeactivated));
    }

    #[tokio::test]
    async fn test_api_key_acts_as_owner() {
        let (extractor, user_key) = setup().await;
        let key = store_key(&extractor, &user_key, None).await;

        let ctx = extractor.extract_user(None, Some(&key), None, None).await.unwrap();
        assert_eq!(ctx.user_id().as_str(), user_key);
        assert_eq!(ctx.provider().as_str(), "api_key");
    }

    #[tokio::test]
    async fn test_api_key_invalid_revoked_and_expired() {
        let (extractor, user_key) = setup().await;

        let result = extractor.extract_user(None, Some("lc_nope_nope"), None, None).await;
        assert!(matches!(result.unwrap_err(), AuthError::InvalidApiKey));

        let key = store_key(&extractor, &user_key, None).await;
        let prefix = key.rsplit_once('_').unwrap().0.to_string();
        QueryBuilder::deactivate_api_key_by_prefix(&extractor.db, &prefix)
            .await
            .unwrap();
        let result = extractor.extract_user(None, Some(&key), None, None).await;
        assert!(matches!(result.unwrap_err(), AuthError::ApiKeyRevoked));

        let past = Datetime::from(chrono::Utc::now() - chrono::Duration::hours(1));
        let expired = store_key(&extractor, &user_key, Some(past)).await;
        let result = extractor.extract_user(None, Some(&expired), None, None).await;
        assert!(matches!(result.unwrap_err(), AuthError::ApiKeyExpired));
    }
}
