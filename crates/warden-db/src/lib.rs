//! Warden Database — SurrealDB connection management, schema migrations
//! and repository implementations.
//!
//! This crate provides:
//! - Opening a signed-in, migrated store ([`DbManager::open`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - One SurrealDB repository per `warden-core` repository trait, bundled
//!   as a [`SurrealStore`]
//! - Error types ([`DbError`])

mod connection;
mod convert;
mod error;
mod schema;
mod store;

pub mod repository;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
pub use store::SurrealStore;
