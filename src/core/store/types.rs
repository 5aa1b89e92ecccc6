use serde::Serialize;

/// Prefix carried by locally generated run ids until the correlator has
/// discovered the real remote run.
pub const PLACEHOLDER_RUN_PREFIX: &str = "pending-";

pub fn is_placeholder_run_id(run_id: &str) -> bool {
    run_id.starts_with(PLACEHOLDER_RUN_PREFIX)
}

/// Remote run lifecycle as mirrored locally. Anything GitHub reports that
/// we do not model maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Cancelled,
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            "cancelled" => RunStatus::Cancelled,
            _ => RunStatus::Unknown,
        }
    }

    /// A terminal run can no longer be cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    /// Plaintext personal-access token. Services redact this before
    /// anything user-facing; it must never reach log output.
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowConfigRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub repo: String,
    pub workflow: String,
    pub branch: String,
    /// JSON object text as entered; parsed by the service layer.
    pub inputs: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Owning username, joined in for display. None if the user row is gone.
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRunRecord {
    pub id: i64,
    pub config_id: Option<i64>,
    /// GitHub's run id in string form, or a `pending-` placeholder.
    pub run_id: String,
    pub status: RunStatus,
    /// GitHub's conclusion values form an open set (success, failure,
    /// cancelled, skipped, timed_out, ...); mirrored verbatim.
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    pub logs_url: Option<String>,
    pub workflow_name: String,
    pub repository: String,
    pub branch: String,
    pub trigger_user: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    /// Config display name, joined in. None for runs whose config was deleted.
    pub config_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemLogRecord {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_strings() {
        for s in [
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::Completed,
            RunStatus::Cancelled,
            RunStatus::Unknown,
        ] {
            assert_eq!(RunStatus::parse(s.as_str()), s);
        }
    }

    #[test]
    fn unrecognized_status_maps_to_unknown() {
        assert_eq!(RunStatus::parse("waiting"), RunStatus::Unknown);
        assert_eq!(RunStatus::parse(""), RunStatus::Unknown);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Unknown.is_terminal());
    }

    #[test]
    fn placeholder_prefix_detection() {
        assert!(is_placeholder_run_id("pending-123e4567"));
        assert!(!is_placeholder_run_id("17283940123"));
        assert!(!is_placeholder_run_id(""));
    }
}
