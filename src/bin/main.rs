use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use ledger_crm::db::schema::{ApiKeyCreate, AuditAction, AuditLogCreate, TeamCreate, TeamRecord, UserCreate, UserRecord};
use ledger_crm::db::{Db, QueryBuilder};
use ledger_crm::teams::is_valid_slug;
use ledger_crm::{
    AppConfig, TeamRole, TenantAccessGate, UserContext, UserStore, create_admin_router,
    create_app_state, create_connection, create_public_router, encode_session_token,
    ensure_schema, generate_api_key, load_config,
};

#[derive(Parser)]
#[command(name = "ledger-crm")]
#[command(about = "Multi-tenant CRM with a tenant access gate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the public CRM API and the admin API
    Server {
        /// Bind address for the public API, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
        /// Bind address for the admin API (internal / trusted only)
        #[arg(long)]
        admin_bind: Option<String>,
        #[arg(long)]
        db_url: Option<String>,
        /// HS256 secret used to verify session tokens
        #[arg(long, env = "LEDGER_CRM_SESSION_SECRET")]
        session_secret: Option<String>,
    },
    /// Connect to the database and bootstrap the schema
    Init {
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Create a team (tenant)
    CreateTeam {
        slug: String,
        /// Display name, defaults to the slug
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Create a user, optionally placing them in a team
    CreateUser {
        email: String,
        #[arg(long)]
        display_name: Option<String>,
        /// Team slug or key
        #[arg(long)]
        team: Option<String>,
        /// MEMBER, ADMIN, OWNER or SUPER_ADMIN
        #[arg(long, default_value = "MEMBER")]
        role: String,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Move a user into a team with a role, or out of any team
    SetRole {
        /// User email or key
        user: String,
        /// Team slug or key (omit together with --role to clear membership)
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        role: Option<String>,
        /// Set or clear the legacy admin flag; membership is left alone when
        /// this is the only change
        #[arg(long)]
        legacy_admin: Option<bool>,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Print the access context the gate derives for a user
    Whoami {
        /// User email or key
        user: String,
        /// Also mint a session token valid for this many seconds
        #[arg(long)]
        token_ttl: Option<u64>,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Create an API key acting as a user
    CreateApiKey {
        /// User email or key the key acts as
        #[arg(long)]
        user: String,
        /// Human-readable name for this key
        #[arg(long)]
        name: Option<String>,
        /// Number of days until the key expires (omit for no expiration)
        #[arg(long)]
        expires_days: Option<u32>,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// List all API keys
    ListApiKeys {
        #[arg(long)]
        db_url: Option<String>,
        /// Show only active keys
        #[arg(long, default_value_t = false)]
        active_only: bool,
    },
    /// Revoke an API key by its prefix
    RevokeApiKey {
        /// The key prefix to revoke (e.g., "lc_abc12345")
        key_prefix: String,
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ledger_crm=info".parse()?))
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            bind,
            admin_bind,
            db_url,
            session_secret,
        } => {
            let mut config = config_with_db(db_url)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(admin_bind) = admin_bind {
                config.server.admin_bind = admin_bind;
            }
            if let Some(secret) = session_secret {
                config.auth.session_secret = Some(secret);
            }
            if config.auth.session_secret.is_none() {
                info!("No session secret configured; only API keys will authenticate");
            }
            info!("Using database url: {}", config.database.url);
            info!(
                "Internal team slug: {}",
                config.access.internal_team_slug
            );

            // Shared state for both public and admin routers.
            let state = create_app_state(&config).await?;

            let public_app = create_public_router(state.clone());
            let admin_app = create_admin_router(state);

            let public_listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
            let admin_listener = tokio::net::TcpListener::bind(&config.server.admin_bind).await?;

            info!("Public server listening on http://{}", config.server.bind);
            info!("Admin server listening on http://{}", config.server.admin_bind);

            tokio::try_join!(
                axum::serve(public_listener, public_app),
                axum::serve(admin_listener, admin_app),
            )?;
        }
        Commands::Init { db_url } => {
            let (config, _db) = open(db_url).await?;
            println!("Schema ready at {}", config.database.url);
        }
        Commands::CreateTeam { slug, name, db_url } => {
            let (_, db) = open(db_url).await?;

            if !is_valid_slug(&slug) {
                bail!("Invalid team slug '{}'", slug);
            }
            if QueryBuilder::find_team_by_slug(&db, &slug).await?.is_some() {
                bail!("Team '{}' already exists", slug);
            }

            let team = QueryBuilder::create_team(
                &db,
                &TeamCreate {
                    name: name.unwrap_or_else(|| slug.clone()),
                    slug,
                },
            )
            .await?;

            println!("Team created.");
            println!("  Key:   {}", team.key);
            println!("  Slug:  {}", team.slug);
            println!("  Name:  {}", team.name);
        }
        Commands::CreateUser {
            email,
            display_name,
            team,
            role,
            db_url,
        } => {
            let (_, db) = open(db_url).await?;
            let users = UserStore::new(db.clone());

            let role = parse_role(&role)?;
            let team = match team {
                Some(reference) => Some(find_team(&db, &reference).await?),
                None => None,
            };
            if users.get_user_by_email(&email).await?.is_some() {
                bail!("User '{}' already exists", email);
            }

            let user = users
                .create_user(&UserCreate {
                    email,
                    display_name,
                    team_id: team.as_ref().map(|t| t.key.clone()),
                    team_role: Some(role.as_str().to_string()),
                    ..Default::default()
                })
                .await?;

            println!("User created.");
            println!("  Key:   {}", user.key);
            println!("  Email: {}", user.email);
            match team {
                Some(team) => println!("  Team:  {} ({})", team.slug, role),
                None => println!("  Team:  -"),
            }
        }
        Commands::SetRole {
            user,
            team,
            role,
            legacy_admin,
            db_url,
        } => {
            let (_, db) = open(db_url).await?;
            let users = UserStore::new(db.clone());
            let user = find_user(&users, &user).await?;

            match (team, role) {
                (Some(team), Some(role)) => {
                    let team = find_team(&db, &team).await?;
                    let role = parse_role(&role)?;
                    users
                        .set_membership(&user.key, Some(&team.key), Some(role.as_str()))
                        .await?;
                }
                (None, None) if legacy_admin.is_none() => {
                    users.set_membership(&user.key, None, None).await?;
                }
                (None, None) => {}
                _ => bail!("--team and --role must be given together"),
            }
            if let Some(flag) = legacy_admin {
                users.set_legacy_admin(&user.key, flag).await?;
            }

            let updated = users
                .get_user(&user.key)
                .await?
                .ok_or_else(|| anyhow!("User '{}' disappeared", user.key))?;
            users
                .audit_log(AuditLogCreate {
                    user_id: None,
                    team_id: updated.team_id.clone(),
                    action: AuditAction::RoleChanged.as_str().to_string(),
                    resource_type: "user".to_string(),
                    resource_id: Some(updated.key.clone()),
                    details: Some(serde_json::json!({
                        "team_role": updated.team_role,
                        "is_admin": updated.is_admin,
                        "via": "cli",
                    })),
                })
                .await?;

            println!(
                "{} -> team {} role {} legacy admin {}",
                updated.email,
                updated.team_id.as_deref().unwrap_or("-"),
                updated.team_role.as_deref().unwrap_or("-"),
                updated.is_admin
            );
        }
        Commands::Whoami {
            user,
            token_ttl,
            db_url,
        } => {
            let (config, db) = open(db_url).await?;
            let users = UserStore::new(db.clone());
            let user = find_user(&users, &user).await?;

            let gate = TenantAccessGate::new(db, &config.access);
            let session = UserContext::session(user.key.clone(), Some(user.email.clone()));
            let access = gate.resolve(Some(&session)).await?;

            println!("{}", serde_json::to_string_pretty(&access)?);

            if let Some(ttl) = token_ttl {
                let token = encode_session_token(&config.auth, &user.key, Some(&user.email), ttl)?;
                println!();
                println!("Session token (valid {}s):", ttl);
                println!("{}", token);
                println!("Use with: -H 'Authorization: Bearer {}'", token);
            }
        }
        Commands::CreateApiKey {
            user,
            name,
            expires_days,
            db_url,
        } => {
            let (_, db) = open(db_url).await?;
            let users = UserStore::new(db.clone());
            let user = find_user(&users, &user).await?;
            if !user.is_active {
                bail!("User '{}' is deactivated", user.email);
            }

            // Generate a new API key
            let (full_key, prefix, key_hash) = generate_api_key();

            // Calculate expiration if specified
            let expires_at = expires_days.map(|days| {
                let duration = chrono::Duration::days(days as i64);
                chrono::Utc::now() + duration
            });

            let api_key_create = ApiKeyCreate {
                key_hash,
                key_prefix: prefix.clone(),
                user_id: user.key.clone(),
                name: name.clone(),
                expires_at: expires_at.map(surrealdb::sql::Datetime::from),
            };

            QueryBuilder::create_api_key(&db, &api_key_create).await?;
            users
                .audit_log(AuditLogCreate {
                    user_id: Some(user.key.clone()),
                    team_id: user.team_id.clone(),
                    action: AuditAction::ApiKeyCreated.as_str().to_string(),
                    resource_type: "api_key".to_string(),
                    resource_id: Some(prefix.to_string()),
                    details: None,
                })
                .await?;

            println!("API Key created successfully!");
            println!();
            println!("  Key:     {}", full_key);
            println!("  Prefix:  {}", prefix);
            println!("  User:    {}", user.email);
            if let Some(n) = &name {
                println!("  Name:    {}", n);
            }
            if let Some(exp) = expires_at {
                println!("  Expires: {}", exp.format("%Y-%m-%d %H:%M:%S UTC"));
            } else {
                println!("  Expires: Never");
            }
            println!();
            println!("IMPORTANT: Save this key now. It cannot be retrieved later.");
            println!("Use with: -H 'X-API-Key: {}'", full_key);
        }
        Commands::ListApiKeys {
            db_url,
            active_only,
        } => {
            let (_, db) = open(db_url).await?;

            let api_keys = if active_only {
                QueryBuilder::list_active_api_keys(&db).await?
            } else {
                QueryBuilder::list_api_keys(&db).await?
            };

            if api_keys.is_empty() {
                println!("No API keys found.");
                return Ok(());
            }

            println!(
                "{:<20} {:<20} {:<34} {:<10} {:<25} {:<25}",
                "PREFIX", "NAME", "USER", "STATUS", "CREATED", "LAST USED"
            );
            println!("{}", "-".repeat(134));

            for key in api_keys {
                let status = if key.is_active { "Active" } else { "Revoked" };
                let name = key.name.unwrap_or_else(|| "-".to_string());
                let created = key
                    .created_at
                    .map(|dt| dt.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let last_used = key
                    .last_used_at
                    .map(|dt| dt.to_string())
                    .unwrap_or_else(|| "Never".to_string());

                println!(
                    "{:<20} {:<20} {:<34} {:<10} {:<25} {:<25}",
                    key.key_prefix, name, key.user_id, status, created, last_used
                );
            }
        }
        Commands::RevokeApiKey { key_prefix, db_url } => {
            let (_, db) = open(db_url).await?;

            let revoked = QueryBuilder::deactivate_api_key_by_prefix(&db, &key_prefix).await?;

            if revoked {
                UserStore::new(db)
                    .audit_log(AuditLogCreate {
                        user_id: None,
                        team_id: None,
                        action: AuditAction::ApiKeyRevoked.as_str().to_string(),
                        resource_type: "api_key".to_string(),
                        resource_id: Some(key_prefix.clone()),
                        details: None,
                    })
                    .await?;
                println!("API key '{}' has been revoked.", key_prefix);
            } else {
                println!("No API key found with prefix '{}'.", key_prefix);
            }
        }
    }

    Ok(())
}

/// Layered configuration with the `--db-url` flag applied last.
fn config_with_db(db_url: Option<String>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(url) = db_url {
        config.database.url = url;
    }
    Ok(config)
}

async fn open(db_url: Option<String>) -> Result<(AppConfig, Db)> {
    let config = config_with_db(db_url)?;
    let db = create_connection(config.database.clone()).await?;
    ensure_schema(&db).await?;
    Ok((config, db))
}

fn parse_role(value: &str) -> Result<TeamRole> {
    TeamRole::parse(value).ok_or_else(|| anyhow!("Unknown role '{}'", value))
}

/// Resolve a team by slug first, then by key.
async fn find_team(db: &Db, reference: &str) -> Result<TeamRecord> {
    if let Some(team) = QueryBuilder::find_team_by_slug(db, reference).await? {
        return Ok(team);
    }
    QueryBuilder::find_team_by_key(db, reference)
        .await?
        .ok_or_else(|| anyhow!("No team with slug or key '{}'", reference))
}

async fn find_user(users: &UserStore, reference: &str) -> Result<UserRecord> {
    let found = if reference.contains('@') {
        users.get_user_by_email(reference).await?
    } else {
        users.get_user(reference).await?
    };
    found.ok_or_else(|| anyhow!("No user with email or key '{}'", reference))
}
