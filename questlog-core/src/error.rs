use thiserror::Error;

/// Error taxonomy shared by every database and auth operation.
///
/// The HTTP layer maps each variant to exactly one status code; nothing else
/// in the system invents status codes. A task that exists but belongs to a
/// different owner surfaces as `NotFound`, so callers cannot probe for other
/// users' task ids.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing required input.
    #[error("{0}")]
    Validation(String),

    /// A uniqueness constraint was violated (duplicate username).
    #[error("{0}")]
    Conflict(String),

    /// Missing, unknown, or expired credentials/session token.
    #[error("{0}")]
    Auth(String),

    /// Resource absent, or present but not owned by the caller.
    #[error("{0}")]
    NotFound(String),

    /// Underlying persistence failure. Surfaced as a generic server error;
    /// the detail is logged, never returned to the client.
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Filesystem failure while locating or creating the database file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Password hashing failure (effectively unreachable with valid params).
    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
