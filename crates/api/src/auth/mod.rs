//! Authentication primitives.
//!
//! - [`jwt`] -- access-token generation and validation for user callers.
//! - [`service_key`] -- the shared credential used by the workflow engine.

pub mod jwt;
pub mod service_key;
