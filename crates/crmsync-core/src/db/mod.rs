//! Database layer for crmsync

mod connection;
mod correlation_repository;
mod error_repository;
mod ledger;
mod mapping_repository;
mod migrations;

pub use connection::Database;
pub use correlation_repository::LibSqlCorrelationStore;
pub use error_repository::LibSqlErrorRecorder;
pub use ledger::LibSqlLedger;
pub use mapping_repository::LibSqlMappingStore;
