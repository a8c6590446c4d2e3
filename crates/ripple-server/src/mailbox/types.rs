use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MailboxError;

pub const MAX_CONTENT_LENGTH: usize = 1000;
pub const MAX_ATTACHMENTS: usize = 10;
pub const MAX_ATTACHMENT_PATH_LENGTH: usize = 255;

/// A message row plus its attachment paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub attachments: Vec<String>,
    pub is_read: bool,
    pub is_delivered: bool,
    pub version: i64,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for [`super::MessageMailbox::create`].
#[derive(Debug, Clone)]
pub struct MessageCreate {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub attachments: Vec<String>,
}

impl MessageCreate {
    pub fn new(sender_id: i64, receiver_id: i64, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Send-contract bounds: 1..=1000 characters of content, at most ten
    /// attachment paths of 1..=255 characters each.
    pub fn validate(&self) -> Result<(), MailboxError> {
        let content_len = self.content.chars().count();
        if content_len == 0 || content_len > MAX_CONTENT_LENGTH {
            return Err(MailboxError::InvalidContent {
                max: MAX_CONTENT_LENGTH,
                actual: content_len,
            });
        }
        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(MailboxError::TooManyAttachments {
                max: MAX_ATTACHMENTS,
                actual: self.attachments.len(),
            });
        }
        if let Some(path) = self
            .attachments
            .iter()
            .find(|path| path.is_empty() || path.len() > MAX_ATTACHMENT_PATH_LENGTH)
        {
            return Err(MailboxError::InvalidAttachmentPath {
                max: MAX_ATTACHMENT_PATH_LENGTH,
                actual: path.len(),
            });
        }
        Ok(())
    }
}

/// Incoming JSON body on the send endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDraft {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Page/limit windowing for the pull endpoint. Out-of-range values are
/// clamped, not rejected.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "Pagination::default_page")]
    pub page: i64,
    #[serde(default = "Pagination::default_limit")]
    pub limit: i64,
}

impl Pagination {
    pub const MAX_LIMIT: i64 = 100;

    fn default_page() -> i64 {
        1
    }

    fn default_limit() -> i64 {
        20
    }

    pub fn normalize(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, Self::MAX_LIMIT);
        self
    }

    // Saturating: page is caller-controlled and may be i64::MAX.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}
