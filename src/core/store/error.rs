use thiserror::Error;

/// Storage faults surfaced as values. `DuplicateUsername` is split out so
/// callers can branch on a username collision without string matching.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,

    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Maps a rusqlite error to `DuplicateUsername` when it is a UNIQUE
    /// constraint violation, otherwise wraps it unchanged.
    pub(crate) fn from_insert(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                return StoreError::DuplicateUsername;
            }
        }
        StoreError::Sqlite(err)
    }
}
