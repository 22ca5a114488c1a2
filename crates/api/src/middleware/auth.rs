//! Caller authentication extractors for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use curator_core::error::CoreError;
use curator_core::types::DbId;

use crate::auth::jwt::validate_token;
use crate::auth::service_key::{ON_BEHALF_OF_HEADER, SERVICE_KEY_HEADER};
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from a JWT Bearer token in the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's id (from `claims.sub`).
    pub user_id: DbId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

/// The identity behind a mutation or read request.
///
/// The workflow engine authenticates with `X-Service-Key` and may name the
/// user it acts for with `X-On-Behalf-Of`; everyone else is an [`AuthUser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    User { user_id: DbId },
    Service { on_behalf_of: Option<DbId> },
}

impl Caller {
    /// The user whose rows this caller is restricted to, or `None` for an
    /// unrestricted service caller.
    pub fn scope(&self) -> Option<DbId> {
        match *self {
            Caller::User { user_id } => Some(user_id),
            Caller::Service { on_behalf_of } => on_behalf_of,
        }
    }

    /// Whether this caller may read or mutate a row owned by `owner_id`.
    pub fn can_access(&self, owner_id: DbId) -> bool {
        self.scope().map_or(true, |user_id| user_id == owner_id)
    }

    /// Resolve the owner for a new row from an optional explicit `user_id`.
    ///
    /// Returns `Ok(None)` only for an unrestricted service caller that gave
    /// no explicit owner. An explicit owner that differs from the caller's
    /// scope is rejected.
    pub fn owner_for(&self, explicit: Option<DbId>) -> Result<Option<DbId>, CoreError> {
        match (self.scope(), explicit) {
            (Some(scope), Some(explicit)) if scope != explicit => Err(CoreError::Validation(
                "user_id does not match the authenticated user".into(),
            )),
            (Some(scope), _) => Ok(Some(scope)),
            (None, explicit) => Ok(explicit),
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(presented) = parts.headers.get(SERVICE_KEY_HEADER) else {
            let user = AuthUser::from_request_parts(parts, state).await?;
            return Ok(Caller::User {
                user_id: user.user_id,
            });
        };

        let verified = match (&state.config.service_key, presented.to_str()) {
            (Some(key), Ok(presented)) => key.verify(presented),
            _ => false,
        };
        if !verified {
            tracing::warn!("Rejected request with an invalid service key");
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid service key".into(),
            )));
        }

        let on_behalf_of = match parts.headers.get(ON_BEHALF_OF_HEADER) {
            None => None,
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse::<DbId>().ok())
                    .ok_or_else(|| {
                        AppError::BadRequest("X-On-Behalf-Of must be a user id".into())
                    })?,
            ),
        };

        Ok(Caller::Service { on_behalf_of })
    }
}
