//! Contact relationships. The send path refuses messages between users
//! who are not contacts.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::DatabaseError;

#[derive(Clone)]
pub struct ContactRepository {
    pool: SqlitePool,
}

impl ContactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The relationship is symmetric: an edge in either direction counts.
    pub async fn are_contacts(&self, user_id: i64, other_id: i64) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM contacts
             WHERE (user_id = ? AND contact_id = ?) OR (user_id = ? AND contact_id = ?)
             LIMIT 1",
        )
        .bind(user_id)
        .bind(other_id)
        .bind(other_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Record a contact edge. Re-adding an existing edge is a no-op.
    pub async fn add(&self, user_id: i64, contact_id: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT OR IGNORE INTO contacts (user_id, contact_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(contact_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
