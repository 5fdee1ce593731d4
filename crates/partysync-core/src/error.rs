use thiserror::Error;

use crate::membership::MembershipError;
use crate::remote::RemoteError;

/// Errors surfaced by the `SyncCoordinator`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Absent from both cache and remote store
    #[error("Group not found: {0}")]
    NotFound(String),

    /// Domain validation failure, passed through unchanged
    #[error(transparent)]
    Membership(#[from] MembershipError),

    /// Transient network/server failure; the caller may retry
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote store refused the request or returned an unusable document
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),

    /// The remote document changed or vanished underneath a mutation
    #[error("Conflicting remote change: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub(crate) fn from_remote(key: &str, err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(_) => SyncError::NotFound(key.to_string()),
            RemoteError::Unavailable(msg) => SyncError::RemoteUnavailable(msg),
            RemoteError::Rejected(msg) => SyncError::Rejected(msg),
        }
    }

    /// Whether repeating the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::RemoteUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_remote_keeps_rejections_permanent() {
        let err = SyncError::from_remote("G1", RemoteError::Rejected("403".into()));
        assert_eq!(err, SyncError::Rejected("403".into()));
        assert!(!err.is_transient());

        let err = SyncError::from_remote("G1", RemoteError::Unavailable("timeout".into()));
        assert!(err.is_transient());

        let err = SyncError::from_remote("G1", RemoteError::NotFound("x".into()));
        assert_eq!(err, SyncError::NotFound("G1".into()));
    }
}
