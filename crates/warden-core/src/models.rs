//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod approval;
pub mod audit;
pub mod delegation;
pub mod grant;
pub mod inheritance;
pub mod membership;
pub mod team;
pub mod workflow;
