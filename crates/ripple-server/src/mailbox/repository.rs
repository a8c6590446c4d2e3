//! sqlx access layer for the mailbox tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::types::{Message, MessageCreate, Pagination};
use super::MailboxError;

#[derive(Clone)]
pub struct MessageMailbox {
    pool: SqlitePool,
}

impl MessageMailbox {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a message and its attachment paths in one transaction.
    #[instrument(skip(self, create), fields(sender = create.sender_id, receiver = create.receiver_id))]
    pub async fn create(&self, create: MessageCreate) -> Result<Message, MailboxError> {
        create.validate()?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO messages
                (sender_id, receiver_id, content, is_read, is_delivered, version, edited, created_at, updated_at)
            VALUES (?, ?, ?, 0, 0, 1, 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(create.sender_id)
        .bind(create.receiver_id)
        .bind(&create.content)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&mut *tx)
        .await?;
        let id: i64 = row.get("id");

        for path in &create.attachments {
            sqlx::query("INSERT INTO attachments (message_id, path) VALUES (?, ?)")
                .bind(id)
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(message_id = id, "message persisted");
        Ok(Message {
            id,
            sender_id: create.sender_id,
            receiver_id: create.receiver_id,
            content: create.content,
            attachments: create.attachments,
            is_read: false,
            is_delivered: false,
            version: 1,
            edited: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Parked messages for a receiver in creation order, with attachment
    /// paths (newest first) and the unpaginated total.
    ///
    /// The total comes from a window function over the returned page, so
    /// a page past the last row reports zero even when earlier rows
    /// exist. Callers paging past the end see `([], 0)`.
    #[instrument(skip(self, pagination))]
    pub async fn list_undelivered(
        &self,
        receiver_id: i64,
        pagination: &Pagination,
    ) -> Result<(Vec<Message>, i64), MailboxError> {
        let rows = sqlx::query(
            r#"
            SELECT id, sender_id, receiver_id, content, is_read, is_delivered,
                   version, edited, created_at, updated_at,
                   COUNT(*) OVER () AS total
            FROM messages
            WHERE receiver_id = ? AND is_delivered = 0
            ORDER BY created_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(receiver_id)
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let mut total = 0i64;
        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            total = row.get("total");
            messages.push(row_to_message(row)?);
        }

        if !messages.is_empty() {
            // SQLite has no array binds; expand one placeholder per id.
            let placeholders = vec!["?"; messages.len()].join(", ");
            let sql = format!(
                "SELECT message_id, path FROM attachments
                 WHERE message_id IN ({placeholders})
                 ORDER BY message_id ASC, id DESC"
            );
            let mut query = sqlx::query(&sql);
            for message in &messages {
                query = query.bind(message.id);
            }
            let attachment_rows = query.fetch_all(&self.pool).await?;

            let mut by_id: HashMap<i64, &mut Message> =
                messages.iter_mut().map(|m| (m.id, m)).collect();
            for row in attachment_rows {
                let message_id: i64 = row.get("message_id");
                if let Some(message) = by_id.get_mut(&message_id) {
                    message.attachments.push(row.get("path"));
                }
            }
        }

        Ok((messages, total))
    }

    /// Hard-delete one row; attachments go with it via the cascade. The
    /// delivery coordinator calls this after a confirmed live push.
    #[instrument(skip(self))]
    pub async fn delete(&self, message_id: i64) -> Result<(), MailboxError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MailboxError::NotFound(message_id));
        }
        debug!(message_id, "message purged");
        Ok(())
    }
}

fn row_to_message(row: &SqliteRow) -> Result<Message, MailboxError> {
    Ok(Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        content: row.get("content"),
        attachments: Vec::new(),
        is_read: row.get("is_read"),
        is_delivered: row.get("is_delivered"),
        version: row.get("version"),
        edited: row.get("edited"),
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

fn parse_timestamp(raw: String) -> Result<DateTime<Utc>, MailboxError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MailboxError::Database(sqlx::Error::Decode(Box::new(e))))
}
