//! pg-sample-sync library
//!
//! Copies the tables of one PostgreSQL schema, with at most a fixed number of
//! rows each, from a source database into a disposable target database.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;

pub use config::{Config, ConstraintMode, FailurePolicy, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use models::SyncReport;
pub use sync::{Synchronizer, run, sync};
