//! Curator change event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, fed by the mutation endpoints after commit.
//! - [`ChangeEvent`]: a committed [`RowChange`](curator_core::realtime::RowChange)
//!   stamped with its commit time.

pub mod bus;

pub use bus::{ChangeEvent, EventBus};
