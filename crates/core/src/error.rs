use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The entity does not exist or is not visible to the caller; callers
    /// never learn which.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}
