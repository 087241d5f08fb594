//! Database-specific error types and conversions.

use warden_core::error::WardenError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt {entity} row: {message}")]
    Decode { entity: &'static str, message: String },

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}")]
    Duplicate { entity: String },
}

impl DbError {
    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Classify a failed statement: unique index violations become
    /// [`DbError::Duplicate`], anything else a query error.
    pub(crate) fn from_write(entity: &str, err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        if message.contains("already contains") {
            DbError::Duplicate {
                entity: entity.into(),
            }
        } else {
            DbError::Query(message)
        }
    }

    /// Classify the errors of a cancelled transaction. Every statement
    /// of the transaction reports a failure; a unique index violation
    /// among them wins.
    pub(crate) fn from_transaction<E: std::fmt::Display>(
        entity: &str,
        errors: impl IntoIterator<Item = E>,
    ) -> Self {
        let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
        match messages.iter().find(|m| m.contains("already contains")) {
            Some(_) => DbError::Duplicate {
                entity: entity.into(),
            },
            None => DbError::Query(messages.join("; ")),
        }
    }
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => WardenError::NotFound { entity, id },
            DbError::Duplicate { entity } => WardenError::AlreadyExists { entity },
            other => WardenError::Database(other.to_string()),
        }
    }
}
