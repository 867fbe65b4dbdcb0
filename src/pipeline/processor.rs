//! Quote processor: turns one inbound inquiry into a terminal outcome.
//!
//! Flow:
//! 1. Parse the body into line items (always succeeds)
//! 2. Resolve availability and pricing (only when items exist)
//! 3. Classify → quote when nothing is missing, otherwise triage
//! 4. Record exactly one event, then return the outcome
//!
//! No collaborator failure escapes `process`; each one becomes an `error`
//! outcome or, for notification failures, an annotated `incomplete`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::MailSource;
use crate::erp::{InventoryService, QuoteService};
use crate::error::{ErrorKind, FetchError};
use crate::pipeline::classifier::classify;
use crate::pipeline::parser::{ItemExtractor, RegexExtractor};
use crate::pipeline::triage::{Notifier, TriageReport};
use crate::pipeline::types::{
    AvailabilityMap, ExtractedEmail, InboundEmail, LineItem, MissingReason, OutcomeStatus,
    PricingMap, ProcessingOutcome,
};
use crate::store::{Event, EventStore};

/// Default cap on attempts run at once by `process_batch`.
const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// How an attempt ended, before it is turned into an outcome.
enum Terminal {
    Created {
        quote_id: String,
    },
    Incomplete {
        missing: Vec<MissingReason>,
        notify_failure: Option<String>,
    },
    Failed {
        kind: ErrorKind,
        reason: String,
    },
}

/// Working state of one attempt.
struct Attempt {
    from_email: String,
    subject: String,
    customer_id: Option<String>,
    items: Vec<LineItem>,
    availability: AvailabilityMap,
    pricing: PricingMap,
    currency: String,
}

/// Orchestrates parser, resolver, classifier, quoting, triage and recording.
pub struct QuoteProcessor {
    mail: Arc<dyn MailSource>,
    extractor: Arc<dyn ItemExtractor>,
    inventory: Arc<dyn InventoryService>,
    quotes: Arc<dyn QuoteService>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn EventStore>,
    triage_recipient: String,
    max_concurrency: usize,
}

impl QuoteProcessor {
    /// Create a processor with the regex extractor and default concurrency.
    pub fn new(
        mail: Arc<dyn MailSource>,
        inventory: Arc<dyn InventoryService>,
        quotes: Arc<dyn QuoteService>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn EventStore>,
        triage_recipient: impl Into<String>,
    ) -> Self {
        Self {
            mail,
            extractor: Arc::new(RegexExtractor),
            inventory,
            quotes,
            notifier,
            store,
            triage_recipient: triage_recipient.into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ItemExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Process one inbound email end to end. Never fails: every path ends in
    /// a well-formed outcome, and the event is recorded on a best-effort basis.
    pub async fn process(&self, email: InboundEmail, customer_id: Option<&str>) -> ProcessingOutcome {
        let started = Instant::now();

        let items = self.extractor.extract(&email.body);
        debug!(from = %email.from, items = items.len(), "Parsed inbound email");

        let mut attempt = Attempt {
            from_email: email.from,
            subject: email.subject,
            customer_id: customer_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            items,
            availability: AvailabilityMap::new(),
            pricing: PricingMap::new(),
            currency: String::new(),
        };

        let terminal = self.decide(&mut attempt).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut outcome = build_outcome(attempt, terminal, latency_ms);
        outcome.recorded = self.record(&outcome).await;

        info!(
            status = %outcome.status,
            latency_ms = outcome.latency_ms,
            event_id = %outcome.event_id,
            recorded = outcome.recorded,
            "Quote request processed"
        );
        outcome
    }

    /// Fetch the newest inbound email and process it.
    pub async fn process_next(
        &self,
        customer_id: Option<&str>,
    ) -> Result<ProcessingOutcome, FetchError> {
        let email = self
            .mail
            .fetch(1)
            .await
            .inspect_err(|e| warn!(error = %e, "Mail fetch failed"))?
            .into_iter()
            .next()
            .ok_or(FetchError::Empty)?;
        Ok(self.process(email, customer_id).await)
    }

    /// Fetch up to `limit` emails and process them concurrently.
    /// Outcomes come back in fetch order.
    pub async fn process_batch(
        &self,
        limit: usize,
        customer_id: Option<&str>,
    ) -> Result<Vec<ProcessingOutcome>, FetchError> {
        let emails = self
            .mail
            .fetch(limit)
            .await
            .inspect_err(|e| warn!(error = %e, "Mail fetch failed"))?;
        let count = emails.len();
        info!(count, max_concurrency = self.max_concurrency, "Processing batch");

        let mut indexed: Vec<(usize, ProcessingOutcome)> =
            futures::stream::iter(emails.into_iter().enumerate())
                .map(|(idx, email)| async move { (idx, self.process(email, customer_id).await) })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
        indexed.sort_by_key(|(idx, _)| *idx);

        Ok(indexed.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Fetch and parse without calling any collaborator or writing events.
    pub async fn preview(&self, limit: usize) -> Result<Vec<ExtractedEmail>, FetchError> {
        let emails = self.mail.fetch(limit).await?;
        Ok(emails
            .into_iter()
            .map(|email| ExtractedEmail {
                items: self.extractor.extract(&email.body),
                from_email: email.from,
                subject: email.subject,
            })
            .collect())
    }

    async fn decide(&self, attempt: &mut Attempt) -> Terminal {
        let resolved = if attempt.items.is_empty() {
            debug!("No items parsed, skipping resolver");
            false
        } else {
            match self.inventory.check(&attempt.items).await {
                Ok(resolution) => {
                    debug!(
                        skus = resolution.availability.len(),
                        currency = %resolution.currency,
                        "Items resolved"
                    );
                    attempt.availability = resolution.availability;
                    attempt.pricing = resolution.pricing;
                    attempt.currency = resolution.currency;
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Inventory check failed");
                    return Terminal::Failed {
                        kind: ErrorKind::Resolver,
                        reason: e.to_string(),
                    };
                }
            }
        };

        let missing = classify(
            &attempt.items,
            attempt.customer_id.as_deref(),
            resolved.then_some(&attempt.availability),
        );
        debug!(missing = missing.len(), "Order classified");

        if missing.is_empty() {
            // A complete classification implies a non-blank customer id.
            let customer_id = attempt.customer_id.as_deref().unwrap_or_default();
            return match self.quotes.create_quote(customer_id, &attempt.items).await {
                Ok(quote_id) => {
                    debug!(%quote_id, "Quote created");
                    Terminal::Created { quote_id }
                }
                Err(e) => {
                    warn!(error = %e, "Quote request failed");
                    Terminal::Failed {
                        kind: ErrorKind::Quote,
                        reason: e.to_string(),
                    }
                }
            };
        }

        let report = TriageReport {
            from_email: &attempt.from_email,
            subject: &attempt.subject,
            customer_id: attempt.customer_id.as_deref(),
            items: &attempt.items,
            availability: &attempt.availability,
            pricing: &attempt.pricing,
            currency: &attempt.currency,
            missing: &missing,
        };
        let notification = report.to_notification(&self.triage_recipient);

        let notify_failure = match self.notifier.send(&notification).await {
            Ok(()) => {
                debug!(to = %notification.to, "Triage notification sent");
                None
            }
            Err(e) => {
                warn!(error = %e, "Triage notification failed");
                Some(e.to_string())
            }
        };

        Terminal::Incomplete {
            missing,
            notify_failure,
        }
    }

    /// Write the audit event. Failures are logged and never alter the outcome.
    async fn record(&self, outcome: &ProcessingOutcome) -> bool {
        let event = Event::from_outcome(outcome, Utc::now());
        match self.store.record(&event).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    error = %e,
                    event_id = %event.id,
                    status = %event.status,
                    "Failed to record event"
                );
                false
            }
        }
    }
}

fn build_outcome(attempt: Attempt, terminal: Terminal, latency_ms: u64) -> ProcessingOutcome {
    let (status, missing, quote_id, reason, error_kind) = match terminal {
        Terminal::Created { quote_id } => (OutcomeStatus::Created, None, Some(quote_id), None, None),
        Terminal::Incomplete {
            missing,
            notify_failure,
        } => {
            let kind = notify_failure.as_ref().map(|_| ErrorKind::Notify);
            (OutcomeStatus::Incomplete, Some(missing), None, notify_failure, kind)
        }
        Terminal::Failed { kind, reason } => {
            (OutcomeStatus::Error, None, None, Some(reason), Some(kind))
        }
    };

    ProcessingOutcome {
        status,
        from_email: attempt.from_email,
        subject: attempt.subject,
        customer_id: attempt.customer_id,
        items: attempt.items,
        availability: attempt.availability,
        pricing: attempt.pricing,
        currency: attempt.currency,
        missing,
        quote_id,
        reason,
        error_kind,
        latency_ms,
        recorded: false,
        event_id: Uuid::new_v4(),
    }
}
