use crate::location::PermissionKind;
use crate::session::SessionStatus;

/// Errors surfaced by the session controller. Internal plumbing works with
/// `anyhow`, anything coming from the store or the activity API ends up in
/// `PersistenceFailure`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0} location permission denied")]
    PermissionDenied(PermissionKind),

    #[error("insufficient data: {points} accepted points, at least 2 are required")]
    InsufficientData { points: usize },

    #[error("persistence failure: {0:#}")]
    PersistenceFailure(#[from] anyhow::Error),

    #[error("location provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionStatus,
        action: &'static str,
    },
}

impl SessionError {
    pub fn provider(error: anyhow::Error) -> Self {
        SessionError::ProviderUnavailable(format!("{:#}", error))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
