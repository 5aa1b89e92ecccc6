use thiserror::Error;

use crate::core::store::StoreError;

/// Failures the service layer reports to callers. Logical/state errors get
/// their own variants so the UI can branch on them instead of parsing
/// message strings.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user {0} does not exist")]
    UserNotFound(i64),

    #[error("no stored user named '{0}'")]
    UnknownUsername(String),

    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("token does not look like a GitHub personal-access token")]
    InvalidTokenFormat,

    #[error("GitHub rejected the token")]
    TokenRejected,

    #[error("config {0} does not exist")]
    ConfigNotFound(i64),

    #[error("run {0} does not exist")]
    RunNotFound(i64),

    #[error("run {0} has not been correlated with a remote run yet")]
    PlaceholderRun(String),

    #[error("run {run_id} is already terminal ({status})")]
    AlreadyTerminal { run_id: String, status: String },

    #[error("could not reach GitHub with the stored token")]
    NotConnected,

    #[error("dispatch of {repo}/{workflow} was rejected")]
    DispatchFailed { repo: String, workflow: String },

    #[error("refreshing run {0} from GitHub failed")]
    RefreshFailed(String),

    #[error("GitHub refused to cancel run {0}")]
    CancelRejected(String),

    #[error("fetching logs for run {0} failed")]
    LogsUnavailable(String),

    #[error("invalid workflow inputs: {0}")]
    InvalidInputs(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
