//! Row structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` row struct carrying raw `status_id` columns
//! - A conversion into the matching `curator-core` entity
//! - `Deserialize` input DTOs for inserts and updates

use curator_core::status::StatusId;

pub mod job;
pub mod job_step;
pub mod workflow_error;

/// Map an unknown lookup-table id to a decode error.
pub(crate) fn decode_status<T>(
    column: &'static str,
    id: StatusId,
    lookup: fn(StatusId) -> Option<T>,
) -> Result<T, sqlx::Error> {
    lookup(id).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unknown status id {id}").into(),
    })
}
