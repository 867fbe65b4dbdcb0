//! Quote processing pipeline.
//!
//! Every inbound inquiry flows through:
//! 1. `ItemExtractor::extract()`: free text → line items
//! 2. `InventoryService::check()`: availability, pricing, currency
//! 3. `classify()`: ordered missing reasons
//! 4. `QuoteService::create_quote()` or a triage `Notifier`
//! 5. `EventStore::record()`: one audit event per attempt

pub mod classifier;
pub mod parser;
pub mod processor;
pub mod triage;
pub mod types;

pub use processor::QuoteProcessor;
