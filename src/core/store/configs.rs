use rusqlite::{Row, params};

use super::error::StoreError;
use super::types::WorkflowConfigRecord;
use super::{Database, now_utc};

const CONFIG_SELECT: &str = "SELECT wc.id, wc.user_id, wc.name, wc.repo, wc.workflow, wc.branch,
        wc.inputs, wc.created_at, wc.updated_at, u.username
 FROM workflow_configs wc
 LEFT JOIN users u ON wc.user_id = u.id";

fn row_to_config(row: &Row<'_>) -> rusqlite::Result<WorkflowConfigRecord> {
    Ok(WorkflowConfigRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        repo: row.get(3)?,
        workflow: row.get(4)?,
        branch: row.get(5)?,
        inputs: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        username: row.get(9)?,
    })
}

impl Database {
    pub async fn insert_workflow_config(
        &self,
        user_id: i64,
        name: &str,
        repo: &str,
        workflow: &str,
        branch: &str,
        inputs: Option<&str>,
    ) -> Result<i64, StoreError> {
        let now = now_utc();
        let conn = self.conn();
        let db = conn.lock().await;
        db.execute(
            "INSERT INTO workflow_configs (user_id, name, repo, workflow, branch, inputs, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![user_id, name, repo, workflow, branch, inputs, now, now],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub async fn get_workflow_config_by_id(
        &self,
        config_id: i64,
    ) -> Result<Option<WorkflowConfigRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(&format!("{CONFIG_SELECT} WHERE wc.id = ?1"))?;
        let mut rows = stmt.query_map(params![config_id], row_to_config)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn get_all_workflow_configs(
        &self,
    ) -> Result<Vec<WorkflowConfigRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(&format!("{CONFIG_SELECT} ORDER BY wc.created_at DESC"))?;
        let rows = stmt.query_map([], row_to_config)?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row?);
        }
        Ok(configs)
    }

    pub async fn get_workflow_configs_by_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<WorkflowConfigRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(&format!(
            "{CONFIG_SELECT} WHERE wc.user_id = ?1 ORDER BY wc.created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_config)?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row?);
        }
        Ok(configs)
    }

    pub async fn update_workflow_config(
        &self,
        config_id: i64,
        user_id: i64,
        name: &str,
        repo: &str,
        workflow: &str,
        branch: &str,
        inputs: Option<&str>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let updated = db.execute(
            "UPDATE workflow_configs
             SET user_id = ?1, name = ?2, repo = ?3, workflow = ?4, branch = ?5, inputs = ?6, updated_at = ?7
             WHERE id = ?8",
            params![user_id, name, repo, workflow, branch, inputs, now_utc(), config_id],
        )?;
        Ok(updated > 0)
    }

    /// Cascades to the config's workflow_runs.
    pub async fn delete_workflow_config(&self, config_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let deleted = db.execute(
            "DELETE FROM workflow_configs WHERE id = ?1",
            params![config_id],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{RunStatus, test_database};

    #[tokio::test]
    async fn insert_and_get_config_with_owner_username() {
        let db = test_database().await;
        let user_id = db.insert_user("alice", "t").await.unwrap();
        let id = db
            .insert_workflow_config(
                user_id,
                "deploy prod",
                "acme/app",
                "deploy.yml",
                "release",
                Some(r#"{"env":"prod"}"#),
            )
            .await
            .unwrap();

        let config = db.get_workflow_config_by_id(id).await.unwrap().unwrap();
        assert_eq!(config.name, "deploy prod");
        assert_eq!(config.repo, "acme/app");
        assert_eq!(config.workflow, "deploy.yml");
        assert_eq!(config.branch, "release");
        assert_eq!(config.inputs.as_deref(), Some(r#"{"env":"prod"}"#));
        assert_eq!(config.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn configs_by_user_excludes_other_owners() {
        let db = test_database().await;
        let alice = db.insert_user("alice", "t").await.unwrap();
        let bob = db.insert_user("bob", "t").await.unwrap();
        db.insert_workflow_config(alice, "a", "acme/app", "ci.yml", "main", None)
            .await
            .unwrap();
        db.insert_workflow_config(bob, "b", "acme/app", "ci.yml", "main", None)
            .await
            .unwrap();

        let for_alice = db.get_workflow_configs_by_user(alice).await.unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].name, "a");
        assert_eq!(db.get_all_workflow_configs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_config_rewrites_fields() {
        let db = test_database().await;
        let user_id = db.insert_user("alice", "t").await.unwrap();
        let id = db
            .insert_workflow_config(user_id, "old", "acme/app", "ci.yml", "main", None)
            .await
            .unwrap();

        assert!(
            db.update_workflow_config(
                id,
                user_id,
                "new",
                "acme/other",
                "release.yml",
                "develop",
                Some(r#"{"k":"v"}"#),
            )
            .await
            .unwrap()
        );
        let config = db.get_workflow_config_by_id(id).await.unwrap().unwrap();
        assert_eq!(config.name, "new");
        assert_eq!(config.repo, "acme/other");
        assert_eq!(config.branch, "develop");
    }

    #[tokio::test]
    async fn update_missing_config_returns_false() {
        let db = test_database().await;
        let user_id = db.insert_user("alice", "t").await.unwrap();
        assert!(
            !db.update_workflow_config(42, user_id, "n", "r/r", "w.yml", "main", None)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn delete_config_cascades_to_runs() {
        let db = test_database().await;
        let user_id = db.insert_user("alice", "t").await.unwrap();
        let id = db
            .insert_workflow_config(user_id, "ci", "acme/app", "ci.yml", "main", None)
            .await
            .unwrap();
        db.insert_workflow_run(
            Some(id),
            "12345",
            RunStatus::Completed,
            "ci.yml",
            "acme/app",
            "main",
            "alice",
        )
        .await
        .unwrap();

        assert!(db.delete_workflow_config(id).await.unwrap());
        assert!(db.get_workflow_runs(None).await.unwrap().is_empty());
        assert!(!db.delete_workflow_config(id).await.unwrap());
    }
}
