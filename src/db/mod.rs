//! Database access layer.
//!
//! This module provides:
//! - The seams the sync procedure is written against (`Connector`,
//!   `SourceCatalog`, `TargetDatabase`)
//! - PostgreSQL implementations of them on top of `sqlx`
//! - Identifier quoting and SQL statement builders
//! - Foreign-key ordering of tables

pub mod catalog;
pub mod ddl;
pub mod ident;
pub mod order;
pub mod pool;
pub mod target;

pub use catalog::PgCatalog;
pub use order::{TableOrder, order_tables};
pub use pool::PgConnector;
pub use target::PgTarget;

use crate::config::ConstraintMode;
use crate::error::SyncResult;
use crate::models::{
    ConnectionEndpoint, EnumType, Row, RowBatch, TableConstraint, TableDescriptor,
};
use std::future::Future;

/// Read-only view of the source database's catalog and data.
pub trait SourceCatalog: Send + Sync {
    /// Names of the base tables in `schema`.
    fn list_tables(&self, schema: &str) -> impl Future<Output = SyncResult<Vec<String>>> + Send;

    /// Columns (ordinal order) and primary key of one table.
    fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = SyncResult<TableDescriptor>> + Send;

    /// Unique, check and foreign-key constraints of every table in `schema`.
    fn list_constraints(
        &self,
        schema: &str,
    ) -> impl Future<Output = SyncResult<Vec<TableConstraint>>> + Send;

    /// Enum types defined in `schema`.
    fn list_enum_types(&self, schema: &str)
    -> impl Future<Output = SyncResult<Vec<EnumType>>> + Send;

    /// Up to `limit` rows of the table's copyable columns, as text.
    fn fetch_rows(
        &self,
        table: &TableDescriptor,
        limit: u32,
        stable_order: bool,
    ) -> impl Future<Output = SyncResult<RowBatch>> + Send;

    /// Release the connection.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Write access to the disposable target database.
pub trait TargetDatabase: Send + Sync {
    /// Create the schema if it does not exist.
    fn ensure_schema(&self, schema: &str) -> impl Future<Output = SyncResult<()>> + Send;

    /// Drop the table and everything depending on it, if it exists.
    fn drop_table(&self, schema: &str, table: &str)
    -> impl Future<Output = SyncResult<()>> + Send;

    /// Drop (cascading) and create an enum type.
    fn recreate_enum(&self, enum_type: &EnumType) -> impl Future<Output = SyncResult<()>> + Send;

    /// Create a table from its descriptor.
    fn create_table(
        &self,
        table: &TableDescriptor,
        mode: ConstraintMode,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Insert one row of copyable column values.
    fn insert_row(
        &self,
        table: &TableDescriptor,
        row: &Row,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Move the sequence owned by `column` past the copied values.
    fn reset_sequence(
        &self,
        table: &TableDescriptor,
        column: &str,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Add a unique, check or foreign-key constraint.
    fn add_constraint(
        &self,
        constraint: &TableConstraint,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Release the connection.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Opens the two endpoints of a run.
pub trait Connector: Send + Sync {
    type Source: SourceCatalog;
    type Target: TargetDatabase;

    fn open_source(
        &self,
        endpoint: &ConnectionEndpoint,
    ) -> impl Future<Output = SyncResult<Self::Source>> + Send;

    fn open_target(
        &self,
        endpoint: &ConnectionEndpoint,
    ) -> impl Future<Output = SyncResult<Self::Target>> + Send;
}
