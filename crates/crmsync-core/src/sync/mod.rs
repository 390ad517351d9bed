//! Bidirectional contact synchronization.

mod engine;
pub mod form;
mod locks;

pub use engine::{
    PropagateRequest, SkipReason, SourceRecord, SyncEngine, SyncMetricsSnapshot, SyncOutcome,
    SyncStores,
};
pub use form::{FormOutcome, FormSkipReason, FormSubmission};
pub use locks::{KeyedGuard, KeyedLocks};
