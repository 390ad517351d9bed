//! Data models for crmsync

mod correlation;
mod direction;
mod field_mapping;
mod processed_event;
mod sync_error;

pub use correlation::ContactCorrelation;
pub use direction::{MappingDirection, Platform, SyncDirection, SyncOrigin};
pub use field_mapping::{
    default_field_mappings, FieldMapping, MappingId, MappingUpdate, TransformKind,
};
pub use processed_event::ProcessedEvent;
pub use sync_error::{ErrorClass, NewSyncError, SyncErrorId, SyncErrorRecord};
