//! `curator-watch` library crate.
//!
//! The client side of job tracking: a change feed that prefers the live
//! WebSocket channel and falls back to polling the REST API, a local job
//! tracker, and the notification dispatcher that turns row changes into
//! at most one user-facing message per transition. The binary entrypoint
//! lives in `main.rs`.

pub mod api;
pub mod config;
pub mod feed;
pub mod notify;
pub mod tracker;
