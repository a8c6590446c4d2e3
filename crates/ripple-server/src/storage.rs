//! Time-limited signed URLs for attachment downloads.
//!
//! The pull path rewrites stored attachment paths into expiring URLs so
//! the file-serving collaborator can verify the MAC without a database
//! round trip.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::mailbox::Message;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub signing_key: String,
    pub url_ttl: Duration,
}

#[derive(Clone)]
pub struct AttachmentSigner {
    base_url: String,
    signing_key: Vec<u8>,
    url_ttl: Duration,
}

impl AttachmentSigner {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            signing_key: config.signing_key.as_bytes().to_vec(),
            url_ttl: config.url_ttl,
        }
    }

    /// Build `{base}/{path}?expires={unix}&sig={hex}` for a stored path.
    pub fn signed_url(&self, path: &str) -> String {
        let expires = Utc::now().timestamp() + self.url_ttl.as_secs() as i64;
        let sig = hex::encode(self.mac(path, expires).finalize().into_bytes());
        format!(
            "{}/{}?expires={expires}&sig={sig}",
            self.base_url,
            path.trim_start_matches('/')
        )
    }

    /// Verify a signature produced by [`signed_url`](Self::signed_url).
    /// Expired links fail regardless of the MAC.
    pub fn verify(&self, path: &str, expires: i64, sig: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(raw) = hex::decode(sig) else {
            return false;
        };
        self.mac(path, expires).verify_slice(&raw).is_ok()
    }

    /// Rewrite every attachment path on the given messages in place.
    pub fn sign_attachments(&self, messages: &mut [Message]) {
        for message in messages {
            for path in &mut message.attachments {
                *path = self.signed_url(path);
            }
        }
    }

    fn mac(&self, path: &str, expires: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC can take key of any size");
        mac.update(path.trim_start_matches('/').as_bytes());
        mac.update(b"|");
        mac.update(expires.to_string().as_bytes());
        mac
    }
}
