use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use hirelink_shared::ChatError;
use hirelink_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Attachment not found: {0}")]
    AttachmentNotFound(Uuid),

    #[error("Attachment too large: {size} bytes (max {max})")]
    AttachmentTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        ServerError::Chat(e.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::AttachmentNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::AttachmentTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::Chat(chat) => match chat {
                ChatError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
                ChatError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
                ChatError::AccessDenied(_) => (StatusCode::FORBIDDEN, self.to_string()),
                ChatError::Expired(_) => (StatusCode::FORBIDDEN, self.to_string()),
                ChatError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
                ChatError::External(_) => {
                    (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
                }
                ChatError::Store(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
                }
            },
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_expected_status() {
        let cases = [
            (ChatError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::NotFound("Message"), StatusCode::NOT_FOUND),
            (ChatError::AccessDenied("x".into()), StatusCode::FORBIDDEN),
            (ChatError::Expired("x".into()), StatusCode::FORBIDDEN),
            (ChatError::Conflict("x".into()), StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            let response = ServerError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
