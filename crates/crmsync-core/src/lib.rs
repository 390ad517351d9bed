//! crmsync-core - Core library for crmsync
//!
//! This crate contains the models, field mapping pipeline, storage layer and
//! sync engine that keep contacts consistent between a source and a target
//! CRM platform. Transport concerns (webhooks, HTTP clients) live in the
//! api crate and reach the engine through the traits in [`store`].

pub mod config;
pub mod db;
pub mod error;
pub mod mapper;
pub mod models;
pub mod path;
pub mod store;
pub mod sync;
pub mod transform;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, PlatformError, Result};
pub use sync::{PropagateRequest, SourceRecord, SyncEngine, SyncOutcome};
