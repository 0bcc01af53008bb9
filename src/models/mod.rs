//! Data models for pg-sample-sync.
//!
//! This module re-exports all model types used throughout the crate.

pub mod endpoint;
pub mod report;
pub mod schema;

// Re-export commonly used types
pub use endpoint::{ConnectionEndpoint, DEFAULT_PG_PORT, EndpointRole};
pub use report::{Stage, StageFailure, SyncReport, TableReport, TableStatus};
pub use schema::{
    ColumnDefinition, ConstraintKind, EnumType, IdentityKind, Row, RowBatch, TableConstraint,
    TableDescriptor,
};
