//! Domain models (SQLx).

pub mod comment;
pub mod permission;
pub mod session;
pub mod user;
