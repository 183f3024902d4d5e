use thiserror::Error;

/// Failure taxonomy for every chat operation.
///
/// The first five variants are surfaced to the caller with a
/// human-readable reason. `External` wraps dependency failures
/// (link preview, email, blob store) that degrade an operation but
/// must never fail it; callers log these and continue.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    Conflict(String),

    #[error("External dependency failed: {0}")]
    External(String),

    #[error("Storage error: {0}")]
    Store(String),
}

impl ChatError {
    /// True for failures the caller caused (as opposed to ours or a
    /// dependency's). Used to pick log levels at the API boundary.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ChatError::Validation(_)
                | ChatError::NotFound(_)
                | ChatError::AccessDenied(_)
                | ChatError::Expired(_)
                | ChatError::Conflict(_)
        )
    }
}

/// Convenience alias used throughout the chat crates.
pub type ChatResult<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_fault_classification() {
        assert!(ChatError::Validation("empty".into()).is_client_fault());
        assert!(ChatError::NotFound("Message").is_client_fault());
        assert!(!ChatError::External("smtp down".into()).is_client_fault());
        assert!(!ChatError::Store("disk".into()).is_client_fault());
    }

    #[test]
    fn not_found_display() {
        assert_eq!(ChatError::NotFound("Room").to_string(), "Room not found");
    }
}
