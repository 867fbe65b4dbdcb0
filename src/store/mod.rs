//! Persistence layer: libSQL-backed append-only event log.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlEventStore;
pub use traits::{Event, EventStore, ReasonCount};
