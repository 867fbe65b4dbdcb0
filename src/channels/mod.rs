//! Mail I/O: inbound inquiry source and outbound SMTP delivery.

pub mod email_types;
pub mod mailhog;
pub mod smtp;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::pipeline::types::InboundEmail;

pub use mailhog::{MailHogConfig, MailHogSource};
pub use smtp::{SmtpConfig, SmtpNotifier};

/// Source of inbound inquiries, newest first.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Fetch up to `limit` messages. An empty inbox is `Ok(vec![])`.
    async fn fetch(&self, limit: usize) -> Result<Vec<InboundEmail>, FetchError>;
}
