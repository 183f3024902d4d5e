//! Request authentication.
//!
//! The caller's identity arrives in the `x-user-id` header, set by the
//! reverse proxy that terminates the session. The extractor validates
//! the id and confirms the account exists.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use hirelink_shared::UserId;

use crate::api::AppState;
use crate::error::ServerError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, extracted per request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ServerError::Unauthorized)?;

        let user_id = UserId::parse(raw).map_err(|_| ServerError::Unauthorized)?;

        // Reject ids that do not correspond to a registered account.
        {
            let db = state.store.lock().await;
            db.get_user(user_id).map_err(|_| ServerError::Unauthorized)?;
        }

        Ok(AuthUser(user_id))
    }
}
