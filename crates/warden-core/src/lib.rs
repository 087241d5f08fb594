//! Warden Core — domain models, repository traits and the error
//! taxonomy shared by the persistence and service crates.

pub mod error;
pub mod models;
pub mod repository;
pub mod response;

pub use error::{DomainError, WardenError, WardenResult};
pub use repository::Store;
pub use response::Outcome;
