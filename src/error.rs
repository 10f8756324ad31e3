use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum LinkError {
    #[error("host network attachment unavailable: missing {0}")]
    AttachmentUnavailable(&'static str),

    #[error("loopback bridge already started at {0}")]
    AlreadyStarted(String),

    #[error("failed to bind loopback endpoint: {0}")]
    BindFailure(#[from] std::io::Error),

    #[error("failed to close loopback endpoint: {0}")]
    CloseFailure(String),

    #[error("Storage connection error: {0}")]
    StorageConnection(#[from] SqlxError),

    #[error("no saved account for device {0}")]
    NotFound(String),

    #[error("Ractor error: {0}")]
    RactorError(String),
}

impl LinkError {
    /// Startup-critical errors. Everything else is contained by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::AttachmentUnavailable(_)
                | LinkError::AlreadyStarted(_)
                | LinkError::BindFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_fatal() {
        assert!(LinkError::AttachmentUnavailable("worker pool").is_fatal());
        assert!(LinkError::AlreadyStarted("local:1".into()).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        assert!(LinkError::from(io).is_fatal());
    }

    #[test]
    fn storage_and_close_errors_are_recoverable() {
        assert!(!LinkError::CloseFailure("panicked".into()).is_fatal());
        assert!(!LinkError::NotFound("dev-1".into()).is_fatal());
        assert!(!LinkError::StorageConnection(SqlxError::PoolClosed).is_fatal());
        assert!(!LinkError::RactorError("gone".into()).is_fatal());
    }
}
