//! `get_current_user` boundary (spec §6): authentication itself — JWT
//! issuance, password hashing, OAuth — is an external collaborator
//! (spec §1 Non-goals). This core only consumes its *result*: an
//! upstream gateway authenticates the caller and forwards the verified
//! user id in `x-user-id`. This extractor loads the corresponding
//! `User` row and rejects the request if it's missing, inactive, or
//! soft-deleted.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::domains::tenant::User;
use crate::errors::ApiError;
use crate::kernel::deps::AppState;

/// The authenticated caller, extractable in any route handler via
/// `AuthUser(user): AuthUser`.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .ok_or(ApiError::AuthError)?
            .to_str()
            .map_err(|_| ApiError::AuthError)?;

        let user_id: Uuid = header.parse().map_err(|_| ApiError::AuthError)?;

        let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|err| ApiError::Internal(err.into()))?
            .ok_or(ApiError::AuthError)?;

        if !user.is_active || user.deleted_at.is_some() {
            return Err(ApiError::AuthError);
        }

        Ok(AuthUser(user))
    }
}
