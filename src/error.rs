//! Error types for POQuotator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors. Plays the storage-failure role for the event recorder.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database operation {op} timed out after {timeout:?}")]
    Timeout { op: String, timeout: Duration },
}

/// Failure of an outbound HTTP call to a collaborating service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Max chars of an error body kept in a `ServiceError::Status`.
const ERROR_BODY_PREVIEW: usize = 200;

impl ServiceError {
    /// Non-success status, keeping only a preview of the body.
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
        }
    }

    /// Classify a transport error from `reqwest`.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

/// Mail source errors. Abort the attempt before parsing.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("mail source call failed: {0}")]
    Service(#[from] ServiceError),

    #[error("mail source returned no messages")]
    Empty,

    #[error("malformed mail source payload: {0}")]
    Malformed(String),
}

/// Inventory/pricing service errors. Terminal for the attempt.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("inventory service failed: {0}")]
    Service(#[from] ServiceError),
}

/// Quoting service errors. Terminal for the attempt.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("quoting service failed: {0}")]
    Service(#[from] ServiceError),

    #[error("quoting service returned no quote id")]
    MissingQuoteId,
}

/// Triage notification delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("delivery failed: {0}")]
    Send(String),
}

/// Closed set of failure kinds surfaced to callers, so they can branch on
/// kind rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fetch,
    Resolver,
    Quote,
    Notify,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Resolver => "resolver",
            Self::Quote => "quote",
            Self::Notify => "notify",
            Self::Storage => "storage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(Self::Fetch),
            "resolver" => Some(Self::Resolver),
            "quote" => Some(Self::Quote),
            "notify" => Some(Self::Notify),
            "storage" => Some(Self::Storage),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
