//! Error types for counseld

use thiserror::Error;

use crate::SessionId;

/// Core error type for counseld operations
#[derive(Debug, Error)]
pub enum CounselError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CounselError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::IpcError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for failures caused by caller input rather than the service
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, CounselError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_joins_all_problems() {
        let err = CounselError::Validation(vec![
            "topic is required".into(),
            "at least one participant is required".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: topic is required; at least one participant is required"
        );
        assert!(err.is_validation());
        assert!(!CounselError::store("disk full").is_validation());
    }
}
