use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::github::GithubClient;
use crate::core::github::types::WorkflowRun;

/// Dispatching a workflow returns no run id, so the run that resulted from
/// a trigger has to be discovered afterwards: wait out a grace period,
/// fetch the newest runs for the workflow, and take the first one created
/// after the trigger timestamp. Best-effort: under concurrent triggers of
/// the same workflow the match can be wrong.

/// Parses a timestamp into UTC. Zone-aware inputs are converted; naive
/// inputs are assumed to be local time. Comparing a naive and an aware
/// timestamp directly is never allowed — everything goes through here
/// first.
pub fn normalize_to_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        return Some(aware.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc));
        }
    }
    None
}

/// Picks the run belonging to a trigger issued at `trigger_time` out of a
/// newest-first page of runs: the first run created strictly after the
/// trigger. Runs with unparseable timestamps are skipped.
pub fn select_run_after<'a>(
    trigger_time: DateTime<Utc>,
    runs: &'a [WorkflowRun],
) -> Option<&'a WorkflowRun> {
    runs.iter().find(|run| {
        normalize_to_utc(&run.created_at)
            .map(|created| created > trigger_time)
            .unwrap_or(false)
    })
}

/// Full trigger-then-locate cycle, run as a background task after a
/// successful dispatch. Returns None when no run shows up in the fetched
/// page — a logged, accepted limitation rather than an error.
pub async fn locate_triggered_run(
    client: &GithubClient,
    repo: &str,
    workflow_id: &str,
    trigger_time: DateTime<Utc>,
    grace_period: Duration,
    page_size: u32,
) -> Option<WorkflowRun> {
    tokio::time::sleep(grace_period).await;

    let runs = client
        .list_workflow_runs(repo, Some(workflow_id), page_size)
        .await;
    match select_run_after(trigger_time, &runs) {
        Some(run) => {
            info!(
                "Correlated trigger of {repo}/{workflow_id} at {trigger_time} with run {}",
                run.id
            );
            Some(run.clone())
        }
        None => {
            warn!(
                "No run of {repo}/{workflow_id} found after {trigger_time} in the latest {} runs",
                runs.len()
            );
            None
        }
    }
}
