mod cipher;
mod configs;
mod error;
mod logs;
mod runs;
mod types;
mod users;

pub use cipher::TokenCipher;
pub use error::StoreError;
pub use types::{
    PLACEHOLDER_RUN_PREFIX, RunStatus, SystemLogRecord, UserRecord, WorkflowConfigRecord,
    WorkflowRunRecord, is_placeholder_run_id,
};

use chrono::Utc;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// SQLite-backed store for users, workflow configs, run mirrors and the
/// system log. Cloning shares the same connection; concurrent tasks open
/// their own via [`Database::reopen`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    cipher: Option<TokenCipher>,
}

pub(crate) fn now_utc() -> String {
    Utc::now().to_rfc3339()
}

impl Database {
    pub async fn open<P: AsRef<Path>>(path: P, encrypt_tokens: bool) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(&path)?;
        create_tables(&conn)?;
        // Schema upgrades run with FK enforcement off: the table rebuild
        // drops and recreates workflow_configs, and cascades from the drop
        // would otherwise wipe dependent run rows.
        upgrade_schema(&conn)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            cipher: if encrypt_tokens {
                Some(TokenCipher::new())
            } else {
                None
            },
        })
    }

    /// Opens an independent connection to the same database file. Used by
    /// the background correlation task, which must not share this handle.
    pub async fn reopen(&self) -> Result<Self, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: self.path.clone(),
            cipher: self.cipher.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub(crate) fn cipher(&self) -> Option<&TokenCipher> {
        self.cipher.as_ref()
    }
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            token TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workflow_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            repo TEXT NOT NULL,
            workflow TEXT NOT NULL,
            branch TEXT NOT NULL DEFAULT 'main',
            inputs TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workflow_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            config_id INTEGER,
            run_id TEXT NOT NULL,
            status TEXT NOT NULL,
            conclusion TEXT,
            html_url TEXT,
            logs_url TEXT,
            workflow_name TEXT NOT NULL,
            repository TEXT NOT NULL,
            branch TEXT NOT NULL,
            trigger_user TEXT NOT NULL,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY (config_id) REFERENCES workflow_configs (id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS system_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            level TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workflow_runs_config_id ON workflow_runs(config_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workflow_configs_user_id ON workflow_configs(user_id)",
        [],
    )?;

    Ok(())
}

/// Additive upgrade for databases created before configs were owned by a
/// user: adds `user_id`, backfills existing rows with the first user, and
/// rebuilds the table so the cascade constraint exists. Running this on an
/// already-upgraded database is a no-op.
pub(crate) fn upgrade_schema(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(workflow_configs)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    if columns.iter().any(|c| c == "user_id") {
        return Ok(());
    }

    info!("Upgrading schema: adding user_id to workflow_configs");

    conn.execute(
        "ALTER TABLE workflow_configs ADD COLUMN user_id INTEGER DEFAULT 1",
        [],
    )?;
    conn.execute(
        "UPDATE workflow_configs SET user_id = 1 WHERE user_id IS NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE workflow_configs_new (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            repo TEXT NOT NULL,
            workflow TEXT NOT NULL,
            branch TEXT NOT NULL DEFAULT 'main',
            inputs TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "INSERT INTO workflow_configs_new
         SELECT id, user_id, name, repo, workflow, branch, inputs, created_at, updated_at
         FROM workflow_configs",
        [],
    )?;
    conn.execute("DROP TABLE workflow_configs", [])?;
    conn.execute(
        "ALTER TABLE workflow_configs_new RENAME TO workflow_configs",
        [],
    )?;

    info!("Schema upgrade complete");
    Ok(())
}

/// Create an on-disk store in a throwaway directory. On disk rather than
/// in-memory so `reopen` exercises the same code path as production.
#[cfg(test)]
pub(crate) async fn test_database() -> Database {
    test_database_with(false).await
}

#[cfg(test)]
pub(crate) async fn test_database_with(encrypt_tokens: bool) -> Database {
    let dir = std::env::temp_dir().join(format!("rundesk-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    Database::open(dir.join("rundesk.db"), encrypt_tokens)
        .await
        .expect("open test db")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_database(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                token TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .unwrap();
        conn.execute(
            "CREATE TABLE workflow_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                repo TEXT NOT NULL,
                workflow TEXT NOT NULL,
                branch TEXT NOT NULL DEFAULT 'main',
                inputs TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO workflow_configs (name, repo, workflow, branch, inputs, created_at, updated_at)
             VALUES ('legacy ci', 'acme/app', 'ci.yml', 'main', NULL, '2023-01-01T00:00:00Z', '2023-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }

    fn config_columns(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("PRAGMA table_info(workflow_configs)").unwrap();
        let cols = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        cols
    }

    #[tokio::test]
    async fn migration_adds_user_id_and_preserves_rows() {
        let dir = std::env::temp_dir().join(format!("rundesk-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("legacy.db");
        legacy_database(&path);

        let db = Database::open(&path, false).await.unwrap();
        let conn = db.conn();
        let guard = conn.lock().await;

        assert!(config_columns(&guard).contains(&"user_id".to_string()));
        let (count, user_id): (i64, i64) = guard
            .query_row(
                "SELECT COUNT(*), MAX(user_id) FROM workflow_configs",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(user_id, 1, "legacy rows backfilled with the default user");
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("rundesk-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("legacy.db");
        legacy_database(&path);

        // Two full open cycles = two migration attempts.
        drop(Database::open(&path, false).await.unwrap());
        let db = Database::open(&path, false).await.unwrap();

        let conn = db.conn();
        let guard = conn.lock().await;
        let cols = config_columns(&guard);
        assert_eq!(
            cols.iter().filter(|c| c.as_str() == "user_id").count(),
            1,
            "second run must not add the column again"
        );
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM workflow_configs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn open_twice_on_fresh_database_is_a_no_op() {
        let dir = std::env::temp_dir().join(format!("rundesk-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fresh.db");
        drop(Database::open(&path, false).await.unwrap());
        let db = Database::open(&path, false).await.unwrap();
        let conn = db.conn();
        let guard = conn.lock().await;
        assert!(config_columns(&guard).contains(&"user_id".to_string()));
    }

    #[tokio::test]
    async fn reopen_sees_writes_from_the_original_handle() {
        let db = test_database().await;
        db.insert_system_log("info", "written before reopen")
            .await
            .unwrap();
        let second = db.reopen().await.unwrap();
        let logs = second.get_system_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "written before reopen");
    }
}
