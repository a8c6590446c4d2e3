//! Embedded, versioned schema migrations. Applied versions are tracked
//! in `schema_migrations`; each migration runs at most once.

use chrono::Utc;
use tracing::{debug, info, instrument};

use super::{Database, DatabaseError};

struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "mailbox schema",
    sql: V0001_MAILBOX_SCHEMA,
}];

const V0001_MAILBOX_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id INTEGER NOT NULL,
    receiver_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    is_delivered INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 1,
    edited INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_receiver_undelivered
    ON messages (receiver_id, is_delivered);

CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    FOREIGN KEY (message_id) REFERENCES messages (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_attachments_message_id
    ON attachments (message_id);

CREATE TABLE IF NOT EXISTS contacts (
    user_id INTEGER NOT NULL,
    contact_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, contact_id)
);
"#;

pub struct MigrationRunner {
    migrations: &'static [Migration],
}

impl MigrationRunner {
    pub fn all() -> Self {
        Self {
            migrations: MIGRATIONS,
        }
    }

    #[instrument(skip_all)]
    pub async fn run(&self, db: &Database) -> Result<(), DatabaseError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(db.pool())
        .await?;

        for migration in self.migrations {
            let applied: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM schema_migrations WHERE version = ?")
                    .bind(migration.version)
                    .fetch_optional(db.pool())
                    .await?;
            if applied.is_some() {
                debug!(version = migration.version, "migration already applied");
                continue;
            }

            sqlx::raw_sql(migration.sql)
                .execute(db.pool())
                .await
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;

            sqlx::query(
                "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)",
            )
            .bind(migration.version)
            .bind(migration.description)
            .bind(Utc::now().to_rfc3339())
            .execute(db.pool())
            .await?;

            info!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }

        Ok(())
    }
}
