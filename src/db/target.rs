//! Writes to the target database.

use crate::config::ConstraintMode;
use crate::db::TargetDatabase;
use crate::db::ddl;
use crate::db::ident::quote_qualified;
use crate::db::pool::with_timeout;
use crate::error::SyncResult;
use crate::models::{EnumType, Row, TableConstraint, TableDescriptor};
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

/// Statement execution on the target endpoint.
#[derive(Debug, Clone)]
pub struct PgTarget {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgTarget {
    /// Wrap an open pool.
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Run a parameterless statement.
    async fn execute(&self, operation: &str, sql: &str) -> SyncResult<()> {
        debug!(operation = operation, sql = %sql, "Executing statement");
        with_timeout(
            operation,
            self.statement_timeout,
            sqlx::query(sql).persistent(false).execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

impl TargetDatabase for PgTarget {
    async fn ensure_schema(&self, schema: &str) -> SyncResult<()> {
        self.execute("create schema", &ddl::create_schema(schema)?)
            .await
    }

    async fn drop_table(&self, schema: &str, table: &str) -> SyncResult<()> {
        self.execute("drop table", &ddl::drop_table(schema, table)?)
            .await
    }

    async fn recreate_enum(&self, enum_type: &EnumType) -> SyncResult<()> {
        self.execute("drop type", &ddl::drop_enum(enum_type)?).await?;
        self.execute("create type", &ddl::create_enum(enum_type)?)
            .await
    }

    async fn create_table(&self, table: &TableDescriptor, mode: ConstraintMode) -> SyncResult<()> {
        self.execute("create table", &ddl::create_table(table, mode)?)
            .await
    }

    async fn insert_row(&self, table: &TableDescriptor, row: &Row) -> SyncResult<()> {
        let sql = ddl::insert_row(table)?;
        let query = row
            .iter()
            .fold(sqlx::query(&sql), |query, value| query.bind(value.as_deref()));
        with_timeout("insert row", self.statement_timeout, query.execute(&self.pool)).await?;
        Ok(())
    }

    async fn reset_sequence(&self, table: &TableDescriptor, column: &str) -> SyncResult<()> {
        let sql = ddl::reset_sequence(table, column)?;
        let qualified = quote_qualified(&table.schema_name, &table.table_name)?;
        debug!(table = %qualified, column = column, "Resetting sequence");
        with_timeout(
            "reset sequence",
            self.statement_timeout,
            sqlx::query(&sql)
                .bind(qualified.as_str())
                .bind(column)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn add_constraint(&self, constraint: &TableConstraint) -> SyncResult<()> {
        self.execute("add constraint", &ddl::add_constraint(constraint)?)
            .await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
