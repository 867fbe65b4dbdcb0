//! POQuotator: turns sales-inquiry emails into ERP quotes or triage notices.

pub mod api;
pub mod channels;
pub mod config;
pub mod erp;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod store;
