//! Error types for sidereal-release.

use crate::types::Release;

/// Result type alias using [`ReleaseError`].
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Errors that can occur while creating or reading releases.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// Database error, including failed transactions and constraint violations.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Scheduler rejected or failed to accept a release.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// The release was committed but a later step failed.
    ///
    /// The release row is not rolled back. Any processes written before the
    /// failure remain persisted; remediation is left to the caller.
    #[error("release {} v{} persisted but not completed: {source}", .release.id, .release.version)]
    Incomplete {
        /// The committed release.
        release: Box<Release>,
        /// The failure that interrupted creation.
        #[source]
        source: Box<ReleaseError>,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReleaseError {
    /// Create a scheduler error.
    #[must_use]
    pub fn scheduler(msg: impl Into<String>) -> Self {
        Self::Scheduler(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a post-commit failure together with the release it interrupted.
    #[must_use]
    pub fn incomplete(release: Release, source: Self) -> Self {
        Self::Incomplete {
            release: Box::new(release),
            source: Box::new(source),
        }
    }

    /// The release that was persisted before this error occurred, if any.
    #[must_use]
    pub fn persisted_release(&self) -> Option<&Release> {
        match self {
            Self::Incomplete { release, .. } => Some(release),
            _ => None,
        }
    }
}
