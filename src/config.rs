//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file
//! (`LEDGER_CRM_CONFIG` or `./ledger-crm.json`) with `${VAR}` expansion,
//! then `LEDGER_CRM_*` environment overrides. The binary applies CLI flags
//! last.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};
use tracing::debug;

use crate::auth::AuthConfig;
use crate::db::DatabaseConfig;

/// Slug of the operator team whose super-admins see every tenant.
pub const DEFAULT_INTERNAL_TEAM_SLUG: &str = "ledger1";

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub access: AccessConfig,
    pub server: ServerConfig,
}

/// Settings consumed by the tenant access gate and scoped repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub internal_team_slug: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            internal_team_slug: DEFAULT_INTERNAL_TEAM_SLUG.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl AccessConfig {
    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Admin API bind address (internal / trusted only).
    pub admin_bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            admin_bind: "127.0.0.1:8081".to_string(),
        }
    }
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("LEDGER_CRM_CONFIG") {
        return Some(PathBuf::from(p));
    }

    let candidate = PathBuf::from("ledger-crm.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Load configuration from the resolved file (if any) and the process
/// environment.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let mut cfg = match resolve_config_path() {
        Some(path) => load_config_file(&path, |name| env::var(name).ok())?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut cfg, |name| env::var(name).ok());
    Ok(cfg)
}

pub fn load_config_file(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<AppConfig> {
    debug!("Loading configuration from {}", path.display());
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let expanded = expand_env_vars(&raw, &lookup);
    let cfg: AppConfig = serde_json::from_str(&expanded)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(cfg)
}

pub fn apply_env_overrides(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(slug) = lookup("LEDGER_CRM_INTERNAL_TEAM_SLUG") {
        cfg.access.internal_team_slug = slug;
    }
    if let Some(secret) = lookup("LEDGER_CRM_SESSION_SECRET") {
        cfg.auth.session_secret = Some(secret);
    }
    if let Some(issuer) = lookup("LEDGER_CRM_SESSION_ISSUER") {
        cfg.auth.session_issuer = Some(issuer);
    }
    if let Some(bind) = lookup("LEDGER_CRM_BIND") {
        cfg.server.bind = bind;
    }
    if let Some(bind) = lookup("LEDGER_CRM_ADMIN_BIND") {
        cfg.server.admin_bind = bind;
    }
    if let Some(url) = lookup("SURREALDB_URL") {
        cfg.database.url = url;
    }
    if let Some(size) = lookup("LEDGER_CRM_MAX_PAGE_SIZE").and_then(|v| v.parse().ok()) {
        cfg.access.max_page_size = size;
    }
}

/// Replace `${NAME}` with the looked-up value; unknown names are left as-is.
fn expand_env_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Some(val) = lookup(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
