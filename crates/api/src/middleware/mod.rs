//! Request extractors for authentication.
//!
//! - [`auth::AuthUser`] -- an end user authenticated by a JWT Bearer token.
//! - [`auth::Caller`] -- either an end user or the workflow engine service.

pub mod auth;
