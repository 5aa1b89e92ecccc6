use rusqlite::{Row, params};

use super::error::StoreError;
use super::types::{RunStatus, WorkflowRunRecord};
use super::{Database, now_utc};

const RUN_SELECT: &str = "SELECT wr.id, wr.config_id, wr.run_id, wr.status, wr.conclusion,
        wr.html_url, wr.logs_url, wr.workflow_name, wr.repository, wr.branch,
        wr.trigger_user, wr.created_at, wr.completed_at, wc.name
 FROM workflow_runs wr
 LEFT JOIN workflow_configs wc ON wr.config_id = wc.id";

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<WorkflowRunRecord> {
    let status: String = row.get(3)?;
    Ok(WorkflowRunRecord {
        id: row.get(0)?,
        config_id: row.get(1)?,
        run_id: row.get(2)?,
        status: RunStatus::parse(&status),
        conclusion: row.get(4)?,
        html_url: row.get(5)?,
        logs_url: row.get(6)?,
        workflow_name: row.get(7)?,
        repository: row.get(8)?,
        branch: row.get(9)?,
        trigger_user: row.get(10)?,
        created_at: row.get(11)?,
        completed_at: row.get(12)?,
        config_name: row.get(13)?,
    })
}

impl Database {
    /// Inserts a run mirror row. `run_id` is a `pending-` placeholder when
    /// called speculatively right after a dispatch.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_workflow_run(
        &self,
        config_id: Option<i64>,
        run_id: &str,
        status: RunStatus,
        workflow_name: &str,
        repository: &str,
        branch: &str,
        trigger_user: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        db.execute(
            "INSERT INTO workflow_runs
             (config_id, run_id, status, workflow_name, repository, branch, trigger_user, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                config_id,
                run_id,
                status.as_str(),
                workflow_name,
                repository,
                branch,
                trigger_user,
                now_utc()
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Supersedes a speculative row with the remote run the correlator
    /// located.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve_pending_run(
        &self,
        internal_id: i64,
        remote_run_id: &str,
        status: RunStatus,
        conclusion: Option<&str>,
        html_url: Option<&str>,
        logs_url: Option<&str>,
        remote_created_at: Option<&str>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let updated = db.execute(
            "UPDATE workflow_runs
             SET run_id = ?1, status = ?2, conclusion = ?3, html_url = ?4, logs_url = ?5,
                 created_at = COALESCE(?6, created_at)
             WHERE id = ?7",
            params![
                remote_run_id,
                status.as_str(),
                conclusion,
                html_url,
                logs_url,
                remote_created_at,
                internal_id
            ],
        )?;
        Ok(updated > 0)
    }

    pub async fn update_workflow_run_status(
        &self,
        internal_id: i64,
        status: RunStatus,
        conclusion: Option<&str>,
    ) -> Result<bool, StoreError> {
        let completed_at = if status.is_terminal() {
            Some(now_utc())
        } else {
            None
        };
        let conn = self.conn();
        let db = conn.lock().await;
        let updated = db.execute(
            "UPDATE workflow_runs
             SET status = ?1, conclusion = ?2,
                 completed_at = COALESCE(completed_at, ?3)
             WHERE id = ?4",
            params![status.as_str(), conclusion, completed_at, internal_id],
        )?;
        Ok(updated > 0)
    }

    pub async fn get_workflow_run_by_id(
        &self,
        internal_id: i64,
    ) -> Result<Option<WorkflowRunRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(&format!("{RUN_SELECT} WHERE wr.id = ?1"))?;
        let mut rows = stmt.query_map(params![internal_id], row_to_run)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Newest-first; optionally limited to one config's runs.
    pub async fn get_workflow_runs(
        &self,
        config_id: Option<i64>,
    ) -> Result<Vec<WorkflowRunRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut runs = Vec::new();
        match config_id {
            Some(id) => {
                let mut stmt = db.prepare(&format!(
                    "{RUN_SELECT} WHERE wr.config_id = ?1 ORDER BY wr.created_at DESC, wr.id DESC"
                ))?;
                let rows = stmt.query_map(params![id], row_to_run)?;
                for row in rows {
                    runs.push(row?);
                }
            }
            None => {
                let mut stmt = db.prepare(&format!(
                    "{RUN_SELECT} ORDER BY wr.created_at DESC, wr.id DESC"
                ))?;
                let rows = stmt.query_map([], row_to_run)?;
                for row in rows {
                    runs.push(row?);
                }
            }
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;
    use super::*;

    async fn seeded_config(db: &Database) -> i64 {
        let user_id = db.insert_user("alice", "t").await.unwrap();
        db.insert_workflow_config(user_id, "ci", "acme/app", "ci.yml", "main", None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn speculative_insert_then_resolve() {
        let db = test_database().await;
        let config_id = seeded_config(&db).await;
        let internal = db
            .insert_workflow_run(
                Some(config_id),
                "pending-abc",
                RunStatus::Queued,
                "ci.yml",
                "acme/app",
                "main",
                "alice",
            )
            .await
            .unwrap();

        assert!(
            db.resolve_pending_run(
                internal,
                "987654321",
                RunStatus::InProgress,
                None,
                Some("https://github.com/acme/app/actions/runs/987654321"),
                Some("https://api.github.com/repos/acme/app/actions/runs/987654321/logs"),
                Some("2024-06-01T12:00:05Z"),
            )
            .await
            .unwrap()
        );

        let run = db.get_workflow_run_by_id(internal).await.unwrap().unwrap();
        assert_eq!(run.run_id, "987654321");
        assert_eq!(run.status, RunStatus::InProgress);
        assert_eq!(run.created_at, "2024-06-01T12:00:05Z");
        assert_eq!(run.config_name.as_deref(), Some("ci"));
    }

    #[tokio::test]
    async fn status_update_sets_completed_at_only_on_terminal() {
        let db = test_database().await;
        let config_id = seeded_config(&db).await;
        let internal = db
            .insert_workflow_run(
                Some(config_id),
                "111",
                RunStatus::Queued,
                "ci.yml",
                "acme/app",
                "main",
                "alice",
            )
            .await
            .unwrap();

        db.update_workflow_run_status(internal, RunStatus::InProgress, None)
            .await
            .unwrap();
        let run = db.get_workflow_run_by_id(internal).await.unwrap().unwrap();
        assert!(run.completed_at.is_none());

        db.update_workflow_run_status(internal, RunStatus::Completed, Some("success"))
            .await
            .unwrap();
        let run = db.get_workflow_run_by_id(internal).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.conclusion.as_deref(), Some("success"));
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn runs_are_listed_newest_first_and_filterable_by_config() {
        let db = test_database().await;
        let config_id = seeded_config(&db).await;
        for run_id in ["1", "2", "3"] {
            db.insert_workflow_run(
                Some(config_id),
                run_id,
                RunStatus::Completed,
                "ci.yml",
                "acme/app",
                "main",
                "alice",
            )
            .await
            .unwrap();
        }
        db.insert_workflow_run(
            None,
            "4",
            RunStatus::Queued,
            "adhoc.yml",
            "acme/app",
            "main",
            "alice",
        )
        .await
        .unwrap();

        let all = db.get_workflow_runs(None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].run_id, "4", "latest insert first");

        let scoped = db.get_workflow_runs(Some(config_id)).await.unwrap();
        assert_eq!(scoped.len(), 3);
        assert_eq!(scoped[0].run_id, "3");
    }

    #[tokio::test]
    async fn update_missing_run_returns_false() {
        let db = test_database().await;
        assert!(
            !db.update_workflow_run_status(404, RunStatus::Completed, None)
                .await
                .unwrap()
        );
    }
}
