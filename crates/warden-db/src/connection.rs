//! Opening the service's SurrealDB store.

use std::fmt;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::schema::run_migrations;
use crate::store::SurrealStore;

/// Where the store lives and how to sign in. The server fills this from
/// its command line; there are no built-in defaults here.
#[derive(Clone)]
pub struct DbConfig {
    /// `host:port`, optionally prefixed with `ws://` or `wss://`.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    /// The address handed to the WebSocket engine, without any scheme.
    pub fn endpoint(&self) -> &str {
        let url = self.url.trim();
        url.strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .unwrap_or(url)
            .trim_end_matches('/')
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A signed-in, migrated SurrealDB connection.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect as root, select the namespace and database, and bring the
    /// schema up to date. The returned manager is ready to serve.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let endpoint = config.endpoint();
        info!(
            endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "Opening SurrealDB store"
        );

        let db = Surreal::new::<Ws>(endpoint).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        run_migrations(&db).await?;
        info!("SurrealDB store ready");

        Ok(Self { db })
    }

    /// A [`SurrealStore`] sharing this manager's client.
    pub fn store(&self) -> SurrealStore<Client> {
        SurrealStore::new(self.db.clone())
    }
}
