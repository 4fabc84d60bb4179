//! Coach Common - Shared types, configuration and errors for the interview coach
//!
//! Used by coachd and by any transport layer built on top of it.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
