//! Source catalog introspection.
//!
//! SQL queries are organized in the `queries` submodule. Catalog queries read
//! `pg_catalog` directly so that declared types come out of `format_type`
//! (length, precision and array dimensions included) and defaults out of
//! `pg_get_expr`.

use crate::db::SourceCatalog;
use crate::db::ddl;
use crate::db::pool::with_timeout;
use crate::error::{SyncError, SyncResult};
use crate::models::{
    ColumnDefinition, ConstraintKind, EnumType, IdentityKind, Row, RowBatch, TableConstraint,
    TableDescriptor,
};
use futures_util::StreamExt;
use sqlx::{PgPool, Row as _};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    /// Ordinary tables and partitioned parents; partition children are copied through their parent.
    pub const LIST_TABLES: &str = r#"
        SELECT c.relname::text AS table_name
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
        AND c.relkind IN ('r', 'p')
        AND NOT c.relispartition
        ORDER BY c.relname
        "#;

    /// No row when the table does not exist.
    pub const TABLE_KIND: &str = r#"
        SELECT c.relkind::text AS relkind
        FROM pg_class c
        WHERE c.oid = to_regclass(quote_ident($1) || '.' || quote_ident($2))
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            a.attname::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            NOT a.attnotnull AS nullable,
            pg_get_expr(d.adbin, d.adrelid) AS column_default,
            a.attidentity::text AS identity,
            a.attgenerated::text AS generated
        FROM pg_attribute a
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE a.attrelid = (quote_ident($1) || '.' || quote_ident($2))::regclass
        AND a.attnum > 0
        AND NOT a.attisdropped
        ORDER BY a.attnum
        "#;

    pub const DESCRIBE_PRIMARY_KEY: &str = r#"
        SELECT a.attname::text AS column_name
        FROM pg_constraint c
        CROSS JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
        WHERE c.conrelid = (quote_ident($1) || '.' || quote_ident($2))::regclass
        AND c.contype = 'p'
        ORDER BY k.ord
        "#;

    pub const LIST_CONSTRAINTS: &str = r#"
        SELECT
            c.conname::text AS constraint_name,
            src.relname::text AS table_name,
            c.contype::text AS kind,
            pg_get_constraintdef(c.oid) AS definition,
            refns.nspname::text AS referenced_schema,
            ref.relname::text AS referenced_table
        FROM pg_constraint c
        JOIN pg_class src ON src.oid = c.conrelid
        JOIN pg_namespace n ON n.oid = src.relnamespace
        LEFT JOIN pg_class ref ON ref.oid = c.confrelid
        LEFT JOIN pg_namespace refns ON refns.oid = ref.relnamespace
        WHERE n.nspname = $1
        AND c.contype IN ('u', 'c', 'f')
        AND src.relkind IN ('r', 'p')
        AND NOT src.relispartition
        ORDER BY src.relname, c.conname
        "#;

    pub const LIST_ENUM_TYPES: &str = r#"
        SELECT
            t.typname::text AS type_name,
            array_agg(e.enumlabel::text ORDER BY e.enumsortorder) AS labels
        FROM pg_type t
        JOIN pg_enum e ON e.enumtypid = t.oid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname = $1
        GROUP BY t.typname
        ORDER BY t.typname
        "#;
}

/// Catalog and data access on the source endpoint.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgCatalog {
    /// Wrap an open pool.
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    async fn fetch_columns(&self, schema: &str, table: &str) -> SyncResult<Vec<ColumnDefinition>> {
        let rows = with_timeout(
            "describe columns",
            self.statement_timeout,
            sqlx::query(queries::DESCRIBE_COLUMNS)
                .bind(schema)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let column_type: String = row.try_get("column_type")?;
                let nullable: bool = row.try_get("nullable")?;
                let default_value: Option<String> = row.try_get("column_default")?;
                let identity: String = row.try_get("identity")?;
                let generated: String = row.try_get("generated")?;

                let mut col = ColumnDefinition::new(name, column_type, nullable)
                    .with_identity(IdentityKind::parse(&identity));

                match (generated.as_str(), default_value) {
                    ("s", Some(expression)) => col = col.with_generation_expression(expression),
                    (_, Some(default)) => col = col.with_default(default),
                    _ => {}
                }
                Ok(col)
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(SyncError::from)
    }

    async fn fetch_primary_key(&self, schema: &str, table: &str) -> SyncResult<Vec<String>> {
        with_timeout(
            "describe primary key",
            self.statement_timeout,
            sqlx::query_scalar::<_, String>(queries::DESCRIBE_PRIMARY_KEY)
                .bind(schema)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await
    }
}

impl SourceCatalog for PgCatalog {
    async fn list_tables(&self, schema: &str) -> SyncResult<Vec<String>> {
        let tables = with_timeout(
            "list tables",
            self.statement_timeout,
            sqlx::query_scalar::<_, String>(queries::LIST_TABLES)
                .bind(schema)
                .fetch_all(&self.pool),
        )
        .await?;

        debug!(count = tables.len(), schema = schema, "Listed source tables");
        Ok(tables)
    }

    async fn describe_table(&self, schema: &str, table: &str) -> SyncResult<TableDescriptor> {
        let relkind = with_timeout(
            "describe table",
            self.statement_timeout,
            sqlx::query_scalar::<_, String>(queries::TABLE_KIND)
                .bind(schema)
                .bind(table)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| {
            SyncError::schema(
                format!("Table '{}' not found", table),
                format!("{}.{}", schema, table),
            )
        })?;

        let columns = self.fetch_columns(schema, table).await?;
        let primary_key = self.fetch_primary_key(schema, table).await?;

        Ok(TableDescriptor {
            schema_name: schema.to_string(),
            table_name: table.to_string(),
            columns,
            primary_key,
            partitioned: relkind == "p",
        })
    }

    async fn list_constraints(&self, schema: &str) -> SyncResult<Vec<TableConstraint>> {
        let rows = with_timeout(
            "list constraints",
            self.statement_timeout,
            sqlx::query(queries::LIST_CONSTRAINTS)
                .bind(schema)
                .fetch_all(&self.pool),
        )
        .await?;

        let mut constraints = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.try_get("kind")?;
            let Some(kind) = ConstraintKind::parse(&kind) else {
                continue;
            };
            let name: String = row.try_get("constraint_name")?;
            let table: String = row.try_get("table_name")?;
            let definition: String = row.try_get("definition")?;
            let referenced_schema: Option<String> = row.try_get("referenced_schema")?;
            let referenced_table: Option<String> = row.try_get("referenced_table")?;

            let mut constraint = TableConstraint::new(name, schema, table, kind, definition);
            if let (Some(ref_schema), Some(ref_table)) = (referenced_schema, referenced_table) {
                constraint = constraint.with_reference(ref_schema, ref_table);
            }
            constraints.push(constraint);
        }

        debug!(
            count = constraints.len(),
            schema = schema,
            "Listed source constraints"
        );
        Ok(constraints)
    }

    async fn list_enum_types(&self, schema: &str) -> SyncResult<Vec<EnumType>> {
        let rows = with_timeout(
            "list enum types",
            self.statement_timeout,
            sqlx::query(queries::LIST_ENUM_TYPES)
                .bind(schema)
                .fetch_all(&self.pool),
        )
        .await?;

        let mut types = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("type_name")?;
            let labels: Vec<String> = row.try_get("labels")?;
            types.push(EnumType::new(schema, name, labels));
        }
        debug!(count = types.len(), schema = schema, "Listed source enum types");
        Ok(types)
    }

    async fn fetch_rows(
        &self,
        table: &TableDescriptor,
        limit: u32,
        stable_order: bool,
    ) -> SyncResult<RowBatch> {
        let sql = ddl::select_rows(table, stable_order)?;
        debug!(table = %table.qualified_name(), limit = limit, sql = %sql, "Fetching rows");

        let results = match tokio::time::timeout(
            self.statement_timeout,
            sqlx::query(&sql)
                .bind(i64::from(limit))
                .fetch(&self.pool)
                .take(limit as usize)
                .collect::<Vec<_>>(),
        )
        .await
        {
            Ok(results) => results,
            Err(_) => {
                return Err(SyncError::timeout(
                    "row fetch",
                    self.statement_timeout.as_secs(),
                ));
            }
        };

        let mut batch = Vec::with_capacity(results.len());
        for result in results {
            let row = result?;
            let values = (0..row.len())
                .map(|idx| row.try_get::<Option<String>, _>(idx))
                .collect::<Result<Row, _>>()?;
            batch.push(values);
        }
        Ok(batch)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
