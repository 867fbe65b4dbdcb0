//! HTTP surface for the quote pipeline.

pub mod routes;

pub use routes::{AppState, quote_routes};
