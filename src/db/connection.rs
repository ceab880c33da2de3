use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::debug;

use crate::crm::EntityKind;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "ledger".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "crm".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory database, used by tests and local single-process runs.
    pub fn memory() -> Self {
        Self {
            url: "memory".to_string(),
            namespace: "ledger".to_string(),
            database: "crm".to_string(),
            username: None,
            password: None,
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        "DEFINE TABLE IF NOT EXISTS team SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS key ON TABLE team TYPE string;
         DEFINE FIELD IF NOT EXISTS slug ON TABLE team TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE team TYPE string;
         DEFINE INDEX IF NOT EXISTS team_key ON TABLE team COLUMNS key UNIQUE;
         DEFINE INDEX IF NOT EXISTS team_slug ON TABLE team COLUMNS slug UNIQUE;",

        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS key ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS team_id ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS team_role ON TABLE user TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS is_admin ON TABLE user TYPE bool DEFAULT false;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE user TYPE bool DEFAULT true;
         DEFINE INDEX IF NOT EXISTS user_key ON TABLE user COLUMNS key UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_team ON TABLE user COLUMNS team_id;",

        "DEFINE TABLE IF NOT EXISTS audit_log SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS action ON TABLE audit_log TYPE string;
         DEFINE FIELD IF NOT EXISTS resource_type ON TABLE audit_log TYPE string;
         DEFINE FIELD IF NOT EXISTS team_id ON TABLE audit_log TYPE option<string>;
         DEFINE INDEX IF NOT EXISTS audit_log_team ON TABLE audit_log COLUMNS team_id;",

        "DEFINE TABLE IF NOT EXISTS api_key SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS key_hash ON TABLE api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS key_prefix ON TABLE api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE api_key TYPE string;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE api_key TYPE bool DEFAULT true;
         DEFINE INDEX IF NOT EXISTS api_key_hash ON TABLE api_key COLUMNS key_hash UNIQUE;
         DEFINE INDEX IF NOT EXISTS api_key_prefix ON TABLE api_key COLUMNS key_prefix;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    // Every team-owned CRM table gets the same ownership fields and index.
    for kind in EntityKind::all() {
        let table = kind.table();
        let query = format!(
            "DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;
             DEFINE FIELD IF NOT EXISTS key ON TABLE {table} TYPE string;
             DEFINE FIELD IF NOT EXISTS team_id ON TABLE {table} TYPE string;
             DEFINE INDEX IF NOT EXISTS {table}_key ON TABLE {table} COLUMNS key UNIQUE;
             DEFINE INDEX IF NOT EXISTS {table}_team ON TABLE {table} COLUMNS team_id;"
        );
        db.query(query).await?.check()?;
        debug!("Ensured schema for table {}", table);
    }

    Ok(())
}
