//! Stavitel Shared Types and Utilities
//!
//! Types and database helpers shared across the Stavitel platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
