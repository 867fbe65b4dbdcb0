//! MailHog REST mail source.
//!
//! Polls `GET {api}?limit=N` (newest first). Each item's raw RFC 822 data is
//! decoded with mail-parser when present; otherwise the pre-split headers and
//! body from the JSON payload are used.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::MessageParser;
use serde::Deserialize;
use tracing::debug;

use super::MailSource;
use super::email_types::{normalize_address, strip_quoted_text};
use crate::config::{ConfigLookup, env_or, env_parse};
use crate::error::{ConfigError, FetchError, ServiceError};
use crate::pipeline::types::InboundEmail;

/// Mail source settings.
#[derive(Debug, Clone)]
pub struct MailHogConfig {
    /// Messages endpoint, e.g. `http://mailhog:8025/api/v2/messages`.
    pub api_url: String,
    pub timeout: Duration,
}

impl MailHogConfig {
    pub fn from_lookup(lookup: ConfigLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: env_or(lookup, "MAILHOG_API", "http://mailhog:8025/api/v2/messages"),
            timeout: Duration::from_secs(env_parse(lookup, "MAIL_FETCH_TIMEOUT_SECS", 10)?),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct MessagesPage {
    #[serde(default)]
    items: Vec<MailHogItem>,
}

#[derive(Debug, Default, Deserialize)]
struct MailHogItem {
    #[serde(rename = "Content", default)]
    content: MailHogContent,
    #[serde(rename = "Raw", default)]
    raw: Option<MailHogRaw>,
}

#[derive(Debug, Default, Deserialize)]
struct MailHogContent {
    #[serde(rename = "Headers", default)]
    headers: HashMap<String, Vec<String>>,
    #[serde(rename = "Body", default)]
    body: String,
}

#[derive(Debug, Default, Deserialize)]
struct MailHogRaw {
    #[serde(rename = "Data", default)]
    data: String,
}

impl MailHogItem {
    fn header(&self, name: &str) -> &str {
        self.content
            .headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    fn into_inbound(self) -> InboundEmail {
        let parsed = self
            .raw
            .as_ref()
            .filter(|raw| !raw.data.is_empty())
            .and_then(|raw| MessageParser::default().parse(raw.data.as_bytes()));

        let (from, subject, body) = match parsed {
            Some(msg) => {
                let from = msg
                    .from()
                    .and_then(|addr| addr.first())
                    .and_then(|a| a.address())
                    .map(str::to_string)
                    .unwrap_or_else(|| self.header("From").to_string());
                let subject = msg
                    .subject()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.header("Subject").to_string());
                let body = msg
                    .body_text(0)
                    .map(|b| b.into_owned())
                    .unwrap_or_else(|| self.content.body.clone());
                (from, subject, body)
            }
            None => (
                self.header("From").to_string(),
                self.header("Subject").to_string(),
                self.content.body.clone(),
            ),
        };

        InboundEmail {
            from: normalize_address(&from),
            subject: subject.trim().to_string(),
            body: strip_quoted_text(&body),
        }
    }
}

/// Reads inbound inquiries from a MailHog instance.
pub struct MailHogSource {
    client: reqwest::Client,
    config: MailHogConfig,
}

impl MailHogSource {
    pub fn new(config: MailHogConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl MailSource for MailHogSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<InboundEmail>, FetchError> {
        let timeout = self.config.timeout;
        let resp = self
            .client
            .get(&self.config.api_url)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::status(status.as_u16(), &body).into());
        }

        let page: MessagesPage = resp.json().await.map_err(|e| {
            if e.is_decode() {
                FetchError::Malformed(e.to_string())
            } else {
                FetchError::Service(ServiceError::from_reqwest(e, timeout))
            }
        })?;

        debug!(count = page.items.len(), "Fetched inbound emails");
        Ok(page
            .items
            .into_iter()
            .take(limit)
            .map(MailHogItem::into_inbound)
            .collect())
    }
}
