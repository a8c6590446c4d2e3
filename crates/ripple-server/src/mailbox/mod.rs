//! Durable message mailbox.
//!
//! Messages land here first on every send; a row survives exactly as
//! long as its message has not been confirmed delivered. Deletion is the
//! delivery-state transition — the boolean flags on the row are
//! informational and never flipped.

mod repository;
mod types;

pub use repository::MessageMailbox;
pub use types::{
    Message, MessageCreate, MessageDraft, Pagination, MAX_ATTACHMENTS, MAX_ATTACHMENT_PATH_LENGTH,
    MAX_CONTENT_LENGTH,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("content must be 1..={max} characters, got {actual}")]
    InvalidContent { max: usize, actual: usize },

    #[error("at most {max} attachments allowed, got {actual}")]
    TooManyAttachments { max: usize, actual: usize },

    #[error("attachment path must be 1..={max} characters, got {actual}")]
    InvalidAttachmentPath { max: usize, actual: usize },

    #[error("message not found: {0}")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MailboxError {
    /// Validation failures are the caller's fault; everything else maps to
    /// an internal error at the API boundary.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MailboxError::InvalidContent { .. }
                | MailboxError::TooManyAttachments { .. }
                | MailboxError::InvalidAttachmentPath { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MigrationRunner};

    async fn test_mailbox() -> MessageMailbox {
        let db = Database::in_memory().await.unwrap();
        MigrationRunner::all().run(&db).await.unwrap();
        MessageMailbox::new(db.pool().clone())
    }

    #[tokio::test]
    async fn create_then_list_returns_the_row() {
        let mailbox = test_mailbox().await;
        let create = MessageCreate::new(1, 2, "hello bob")
            .with_attachments(vec!["photos/a.png".into(), "photos/b.png".into()]);

        let message = mailbox.create(create).await.unwrap();
        assert!(message.id > 0);
        assert!(!message.is_delivered);
        assert!(!message.is_read);
        assert_eq!(message.version, 1);

        let (records, total) = mailbox
            .list_undelivered(2, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "hello bob");
        assert_eq!(records[0].sender_id, 1);
        // Attachments come back newest-first.
        assert_eq!(records[0].attachments, vec!["photos/b.png", "photos/a.png"]);
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_receiver() {
        let mailbox = test_mailbox().await;
        mailbox.create(MessageCreate::new(1, 2, "for bob")).await.unwrap();
        mailbox.create(MessageCreate::new(1, 3, "for carol")).await.unwrap();

        let (records, total) = mailbox
            .list_undelivered(2, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].content, "for bob");
    }

    #[tokio::test]
    async fn list_preserves_creation_order() {
        let mailbox = test_mailbox().await;
        for i in 1..=3 {
            mailbox
                .create(MessageCreate::new(1, 2, format!("message {i}")))
                .await
                .unwrap();
        }

        let (records, _) = mailbox
            .list_undelivered(2, &Pagination::default())
            .await
            .unwrap();
        let contents: Vec<_> = records.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["message 1", "message 2", "message 3"]);
    }

    #[tokio::test]
    async fn pagination_windows_the_results() {
        let mailbox = test_mailbox().await;
        for i in 1..=5 {
            mailbox
                .create(MessageCreate::new(1, 2, format!("message {i}")))
                .await
                .unwrap();
        }

        let page = Pagination { page: 2, limit: 2 }.normalize();
        let (records, total) = mailbox.list_undelivered(2, &page).await.unwrap();

        assert_eq!(total, 5);
        let contents: Vec<_> = records.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["message 3", "message 4"]);
    }

    #[tokio::test]
    async fn delete_purges_the_row() {
        let mailbox = test_mailbox().await;
        let message = mailbox.create(MessageCreate::new(1, 2, "ephemeral")).await.unwrap();

        mailbox.delete(message.id).await.unwrap();

        let (records, total) = mailbox
            .list_undelivered(2, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(records.is_empty());

        let err = mailbox.delete(message.id).await.unwrap_err();
        assert!(matches!(err, MailboxError::NotFound(id) if id == message.id));
    }

    #[tokio::test]
    async fn create_rejects_invalid_input() {
        let mailbox = test_mailbox().await;

        let err = mailbox
            .create(MessageCreate::new(1, 2, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, MailboxError::InvalidContent { .. }));

        let err = mailbox
            .create(MessageCreate::new(1, 2, "x".repeat(MAX_CONTENT_LENGTH + 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, MailboxError::InvalidContent { .. }));

        let attachments = vec!["a.png".to_string(); MAX_ATTACHMENTS + 1];
        let err = mailbox
            .create(MessageCreate::new(1, 2, "ok").with_attachments(attachments))
            .await
            .unwrap_err();
        assert!(matches!(err, MailboxError::TooManyAttachments { .. }));

        let long_path = "p".repeat(MAX_ATTACHMENT_PATH_LENGTH + 1);
        let err = mailbox
            .create(MessageCreate::new(1, 2, "ok").with_attachments(vec![long_path]))
            .await
            .unwrap_err();
        assert!(matches!(err, MailboxError::InvalidAttachmentPath { .. }));

        // Nothing was persisted.
        let (_, total) = mailbox
            .list_undelivered(2, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn boundary_lengths_are_accepted() {
        let mailbox = test_mailbox().await;
        let create = MessageCreate::new(1, 2, "x".repeat(MAX_CONTENT_LENGTH))
            .with_attachments(vec!["p".repeat(MAX_ATTACHMENT_PATH_LENGTH); MAX_ATTACHMENTS]);

        let message = mailbox.create(create).await.unwrap();
        assert_eq!(message.attachments.len(), MAX_ATTACHMENTS);
    }

    #[test]
    fn pagination_normalization_clamps_bounds() {
        let page = Pagination { page: 0, limit: 0 }.normalize();
        assert_eq!((page.page, page.limit), (1, 1));

        let page = Pagination { page: 3, limit: 1000 }.normalize();
        assert_eq!((page.page, page.limit), (3, Pagination::MAX_LIMIT));
        assert_eq!(page.offset(), 2 * Pagination::MAX_LIMIT);
    }

    #[test]
    fn extreme_page_values_do_not_overflow_the_offset() {
        let page = Pagination {
            page: i64::MAX,
            limit: 100,
        }
        .normalize();
        assert_eq!(page.offset(), i64::MAX);
    }

    #[tokio::test]
    async fn extreme_page_values_query_cleanly() {
        let mailbox = test_mailbox().await;
        mailbox.create(MessageCreate::new(1, 2, "hello")).await.unwrap();

        let page = Pagination {
            page: i64::MAX,
            limit: 100,
        }
        .normalize();
        let (records, _) = mailbox.list_undelivered(2, &page).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn a_page_past_the_end_reports_zero_total() {
        let mailbox = test_mailbox().await;
        mailbox.create(MessageCreate::new(1, 2, "only row")).await.unwrap();

        // Window-function total is computed over the returned page.
        let page = Pagination { page: 2, limit: 20 }.normalize();
        let (records, total) = mailbox.list_undelivered(2, &page).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(total, 0);
    }
}
