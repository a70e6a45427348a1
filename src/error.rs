//! Error taxonomy shared by the reconciliation, playback and admin components.

use crate::protocol::NoticeLevel;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Every failure the player surfaces to the user or recovers from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    /// Missing or placeholder backend configuration. Falls back to offline mode.
    #[error("configuration error: {0}")]
    Config(String),
    /// Network or backend outage. Triggers the offline fallback.
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),
    /// Write rejected by the backend's access rules.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Any other rejection reported by the backend.
    #[error("remote store error: {0}")]
    Remote(String),
    #[error("invalid admin password")]
    InvalidCredential,
    #[error("backend authentication failed: {0}")]
    BackendAuth(String),
    #[error("'{0}' is protected and cannot be deleted")]
    ProtectedEntity(String),
    #[error("admin login required")]
    NotAuthorized,
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("{0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("another {0} is already in progress")]
    Busy(&'static str),
    #[error("local cache error: {0}")]
    LocalStore(String),
}

impl PlayerError {
    /// Severity used when this error is surfaced as a notice.
    pub fn notice_level(&self) -> NoticeLevel {
        match self {
            PlayerError::RemoteUnavailable(_) | PlayerError::LocalStore(_) => NoticeLevel::Warning,
            PlayerError::Busy(_) | PlayerError::NotFound(_) => NoticeLevel::Info,
            _ => NoticeLevel::Error,
        }
    }

    /// `true` when the failure means the remote store cannot be reached at all.
    pub fn is_offline_trigger(&self) -> bool {
        matches!(
            self,
            PlayerError::Config(_) | PlayerError::RemoteUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for PlayerError {
    fn from(err: rusqlite::Error) -> Self {
        PlayerError::LocalStore(err.to_string())
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(err: serde_json::Error) -> Self {
        PlayerError::LocalStore(err.to_string())
    }
}
