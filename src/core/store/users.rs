use rusqlite::{Row, params};

use super::error::StoreError;
use super::types::UserRecord;
use super::{Database, now_utc};

impl Database {
    fn row_to_user(&self, row: &Row<'_>) -> rusqlite::Result<UserRecord> {
        Ok(UserRecord {
            id: row.get(0)?,
            username: row.get(1)?,
            token: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    /// Decrypts the token column when at-rest encryption is on. A value the
    /// cipher rejects is a legacy plaintext token and passes through as-is.
    fn unseal_token(&self, user: &mut UserRecord) {
        if let Some(cipher) = self.cipher() {
            if let Some(plaintext) = cipher.decrypt(&user.token) {
                user.token = plaintext;
            }
        }
    }

    fn seal_token(&self, token: &str) -> Result<String, StoreError> {
        match self.cipher() {
            Some(cipher) => cipher.encrypt(token),
            None => Ok(token.to_string()),
        }
    }

    /// Fails with [`StoreError::DuplicateUsername`] when the username is
    /// already taken.
    pub async fn insert_user(&self, username: &str, token: &str) -> Result<i64, StoreError> {
        let stored = self.seal_token(token)?;
        let now = now_utc();
        let conn = self.conn();
        let db = conn.lock().await;
        db.execute(
            "INSERT INTO users (username, token, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, stored, now, now],
        )
        .map_err(StoreError::from_insert)?;
        Ok(db.last_insert_rowid())
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, username, token, created_at, updated_at FROM users WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![user_id], |row| self.row_to_user(row))?;
        match rows.next() {
            Some(row) => {
                let mut user = row?;
                self.unseal_token(&mut user);
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    pub async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, username, token, created_at, updated_at FROM users WHERE username = ?1",
        )?;
        let mut rows = stmt.query_map(params![username], |row| self.row_to_user(row))?;
        match rows.next() {
            Some(row) => {
                let mut user = row?;
                self.unseal_token(&mut user);
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    pub async fn get_all_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, username, token, created_at, updated_at FROM users
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| self.row_to_user(row))?;
        let mut users = Vec::new();
        for row in rows {
            let mut user = row?;
            self.unseal_token(&mut user);
            users.push(user);
        }
        Ok(users)
    }

    /// Returns false when the user does not exist; duplicate usernames are
    /// reported the same way as on insert.
    pub async fn update_user(
        &self,
        user_id: i64,
        username: &str,
        token: &str,
    ) -> Result<bool, StoreError> {
        let stored = self.seal_token(token)?;
        let conn = self.conn();
        let db = conn.lock().await;
        let updated = db
            .execute(
                "UPDATE users SET username = ?1, token = ?2, updated_at = ?3 WHERE id = ?4",
                params![username, stored, now_utc(), user_id],
            )
            .map_err(StoreError::from_insert)?;
        Ok(updated > 0)
    }

    /// Cascades to the user's workflow_configs, and from those to
    /// workflow_runs.
    pub async fn delete_user(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn();
        let db = conn.lock().await;
        let deleted = db.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(deleted > 0)
    }
}
