//! SMTP delivery for triage notifications via lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::config::{ConfigLookup, env_opt, env_or, env_parse};
use crate::error::{ConfigError, NotifyError};
use crate::pipeline::triage::{Notification, Notifier};

/// Outbound mail settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// `From` address on every notification.
    pub sender: String,
    /// Fixed recipient of triage messages.
    pub triage_recipient: String,
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn from_lookup(lookup: ConfigLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or(lookup, "SMTP_HOST", "mailhog"),
            port: env_parse(lookup, "SMTP_PORT", 1025)?,
            username: env_opt(lookup, "SMTP_USERNAME"),
            password: env_opt(lookup, "SMTP_PASSWORD").map(SecretString::from),
            sender: env_or(lookup, "SENDER_EMAIL", "noreply@poquotator.local"),
            triage_recipient: env_or(lookup, "TRIAGE_EMAIL", "triage@example.com"),
            timeout: Duration::from_secs(env_parse(lookup, "SMTP_TIMEOUT_SECS", 10)?),
        })
    }
}

/// Sends notifications over SMTP. The transport is blocking, so each send
/// runs on the blocking pool.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(config: &SmtpConfig) -> Result<SmtpTransport, NotifyError> {
        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => SmtpTransport::relay(&config.host)
                .map_err(|e| NotifyError::Send(format!("SMTP relay error: {e}")))?
                .credentials(Credentials::new(
                    user.clone(),
                    pass.expose_secret().to_string(),
                )),
            // Local relays like MailHog speak plain SMTP without auth.
            _ => SmtpTransport::builder_dangerous(&config.host),
        };
        Ok(builder
            .port(config.port)
            .timeout(Some(config.timeout))
            .build())
    }

    fn build_message(config: &SmtpConfig, message: &Notification) -> Result<Message, NotifyError> {
        let from = parse_mailbox(&config.sender)?;
        let to = parse_mailbox(&message.to)?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &Notification) -> Result<(), NotifyError> {
        let email = Self::build_message(&self.config, message)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            let transport = Self::transport(&config)?;
            transport
                .send(&email)
                .map(|_| ())
                .map_err(|e| NotifyError::Send(format!("SMTP send failed: {e}")))
        })
        .await
        .map_err(|e| NotifyError::Send(format!("send task failed: {e}")))??;

        info!(to = %message.to, subject = %message.subject, "Triage email sent");
        Ok(())
    }
}
