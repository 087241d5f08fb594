//! Command-line and environment configuration.

use clap::Parser;
use warden_authz::AuthzConfig;
use warden_db::DbConfig;

/// Warden authorization service
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version)]
#[command(about = "Permission, delegation, team and approval workflow service")]
pub struct Cli {
    /// SurrealDB WebSocket address (env: WARDEN_DB_URL)
    #[arg(long, env = "WARDEN_DB_URL", default_value = "127.0.0.1:8000")]
    pub db_url: String,

    /// SurrealDB namespace (env: WARDEN_DB_NAMESPACE)
    #[arg(long, env = "WARDEN_DB_NAMESPACE", default_value = "warden")]
    pub db_namespace: String,

    /// SurrealDB database (env: WARDEN_DB_DATABASE)
    #[arg(long, env = "WARDEN_DB_DATABASE", default_value = "main")]
    pub db_database: String,

    /// SurrealDB root username (env: WARDEN_DB_USERNAME)
    #[arg(long, env = "WARDEN_DB_USERNAME", default_value = "root")]
    pub db_username: String,

    /// SurrealDB root password (env: WARDEN_DB_PASSWORD)
    #[arg(long, env = "WARDEN_DB_PASSWORD", default_value = "root", hide_env_values = true)]
    pub db_password: String,

    /// Seconds a permission decision stays cached
    #[arg(long, env = "WARDEN_DECISION_CACHE_TTL", default_value_t = 60)]
    pub decision_cache_ttl_secs: u64,

    /// Longest inheritance chain followed by one check
    #[arg(long, env = "WARDEN_MAX_INHERITANCE_DEPTH", default_value_t = 32)]
    pub max_inheritance_depth: usize,

    /// Length in seconds of one workflow timeout hour
    #[arg(long, env = "WARDEN_TIMEOUT_HOUR_SECS", default_value_t = 3600)]
    pub timeout_hour_secs: u64,

    /// Buffered approval events per subscriber
    #[arg(long, env = "WARDEN_EVENT_CAPACITY", default_value_t = 256)]
    pub event_channel_capacity: usize,
}

impl Cli {
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
        }
    }

    pub fn authz_config(&self) -> AuthzConfig {
        AuthzConfig {
            decision_cache_ttl_secs: self.decision_cache_ttl_secs,
            max_inheritance_depth: self.max_inheritance_depth,
            timeout_hour_secs: self.timeout_hour_secs,
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}
