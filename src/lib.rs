// Core modules
pub mod config;
pub mod db;
pub mod types;

// Identity, tenancy and the scoped data layer
pub mod access;
pub mod auth;
pub mod crm;
pub mod teams;

// HTTP surfaces
pub mod api;
pub mod error;

// Re-export key types and functions
pub use access::{AccessContext, TeamRole, TenantAccessGate, TenantFilter, TenantScope};
pub use api::{AppContext, AppState, create_admin_router, create_public_router};
pub use auth::{AuthConfig, AuthExtractor, UserContext, UserStore, encode_session_token, generate_api_key};
pub use config::{AccessConfig, AppConfig, ServerConfig, load_config};
pub use crm::{CrmRepository, EntityKind, EntityRecord, ListParams};
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use teams::TeamAdmin;

use std::sync::Arc;
use anyhow::Result;

/// Convenience function to create the shared state behind both routers.
///
/// Connects to the configured database and bootstraps the schema before
/// wiring the auth extractor, gate, repository and team admin together.
pub async fn create_app_state(config: &AppConfig) -> Result<AppState> {
    let db = create_connection(config.database.clone()).await?;
    ensure_schema(&db).await?;

    Ok(Arc::new(AppContext::new(db, config)))
}
