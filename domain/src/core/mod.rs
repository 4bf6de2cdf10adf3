//! Core domain concepts shared across all subdomains.
//!
//! - [`ids`]: opaque worker, cohort and checkpoint identifiers
//! - [`error::DomainError`]: domain-level errors

pub mod error;
pub mod ids;
