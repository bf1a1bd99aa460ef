//! Page Keeper - Backend Library
//!
//! Page-level access control for internal tools: per-user grants on a fixed
//! set of pages, an authorization resolver, audited page comments and
//! JWT-based sessions with password reset.

#[macro_use]
mod macros;

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
