use rusqlite::params;

use super::error::StoreError;
use super::types::SystemLogRecord;
use super::{Database, now_utc};

impl Database {
    pub async fn insert_system_log(&self, level: &str, message: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        db.execute(
            "INSERT INTO system_logs (level, message, created_at) VALUES (?1, ?2, ?3)",
            params![level, message, now_utc()],
        )?;
        Ok(())
    }

    /// Newest-first, bounded by `limit`.
    pub async fn get_system_logs(&self, limit: u32) -> Result<Vec<SystemLogRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, level, message, created_at FROM system_logs
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(SystemLogRecord {
                id: row.get(0)?,
                level: row.get(1)?,
                message: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_database;

    #[tokio::test]
    async fn log_insert_and_bounded_query() {
        let db = test_database().await;
        for i in 0..5 {
            db.insert_system_log("info", &format!("event {i}")).await.unwrap();
        }
        let logs = db.get_system_logs(3).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "event 4", "newest first");
    }

    #[tokio::test]
    async fn empty_log_returns_empty_vec() {
        let db = test_database().await;
        assert!(db.get_system_logs(10).await.unwrap().is_empty());
    }
}
