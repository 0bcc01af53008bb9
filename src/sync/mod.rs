//! The sync procedure.
//!
//! A run opens both endpoints, copies every table of the schema through the
//! pipeline drop, describe, create, fetch, insert, then adds the deferred
//! constraints and closes both endpoints. Per-table and per-row failures are
//! recorded in the [`SyncReport`]; under [`FailurePolicy::Strict`] the first
//! recorded failure ends the run.

use crate::config::{Config, DEFAULT_SCHEMA, DEFAULT_TARGET_URL, FailurePolicy, SyncSettings};
use crate::db::{Connector, PgConnector, SourceCatalog, TargetDatabase, order_tables};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    Stage, StageFailure, SyncReport, TableConstraint, TableDescriptor, TableReport, TableStatus,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Copy the public schema from `source_url` into `target_url` (or the local
/// development default), at most `row_limit` rows per table.
pub async fn sync(
    source_url: &str,
    target_url: Option<&str>,
    row_limit: u32,
) -> SyncResult<SyncReport> {
    let config = Config {
        source_url: Some(source_url.to_string()),
        target_url: target_url.unwrap_or(DEFAULT_TARGET_URL).to_string(),
        row_limit,
        ..Config::default()
    };
    run(&config, PgConnector::from_settings).await
}

/// Resolve `config`, build a connector from the resolved settings with
/// `connect`, and run.
///
/// Configuration errors are returned before `connect` is called.
pub async fn run<C, F>(config: &Config, connect: F) -> SyncResult<SyncReport>
where
    C: Connector,
    F: FnOnce(&SyncSettings) -> C,
{
    let settings = config.resolve()?;
    let connector = connect(&settings);
    Synchronizer::new(settings).run(&connector).await
}

/// Runs the sync procedure for one set of settings.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    settings: SyncSettings,
}

impl Synchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        Self { settings }
    }

    /// Execute the run.
    ///
    /// Returns `Err` only when an endpoint cannot be opened; both endpoints are
    /// closed on every path.
    pub async fn run<C: Connector>(&self, connector: &C) -> SyncResult<SyncReport> {
        let settings = &self.settings;
        let mut report = SyncReport::new(
            settings.source.masked(),
            settings.target.masked(),
            settings.schema.as_str(),
            settings.row_limit,
            settings.policy,
        );

        info!(
            source = %settings.source,
            target = %settings.target,
            schema = %settings.schema,
            row_limit = settings.row_limit,
            policy = %settings.policy,
            "Starting sync"
        );

        let source = connector.open_source(&settings.source).await?;
        let target = match connector.open_target(&settings.target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        let outcome = self.copy_schema(&source, &target, &mut report).await;

        source.close().await;
        target.close().await;
        report.finish();

        match outcome {
            Ok(()) => {}
            Err(SyncError::Aborted { reason }) => {
                warn!(reason = %reason, "Strict policy stopped the run");
                report.aborted = true;
            }
            Err(e) => return Err(e),
        }

        info!(
            tables_copied = report.tables_copied(),
            tables_skipped = report.tables_skipped(),
            rows_inserted = report.rows_inserted(),
            failures = report.failure_count(),
            duration_ms = report.duration_ms(),
            "Sync finished"
        );
        Ok(report)
    }

    async fn copy_schema<S, T>(
        &self,
        source: &S,
        target: &T,
        report: &mut SyncReport,
    ) -> SyncResult<()>
    where
        S: SourceCatalog,
        T: TargetDatabase,
    {
        let schema = self.settings.schema.as_str();

        if schema != DEFAULT_SCHEMA {
            if let Err(e) = target.ensure_schema(schema).await {
                report
                    .failures
                    .push(failure(Stage::Create, schema, &e));
                self.check_policy(report)?;
            }
        }

        self.copy_enum_types(source, target, report).await?;

        let tables: Vec<String> = match source.list_tables(schema).await {
            Ok(tables) => tables
                .into_iter()
                .filter(|t| !self.settings.is_excluded(t))
                .collect(),
            Err(e) => {
                warn!(schema = schema, error = %e, "Failed to list tables");
                report
                    .failures
                    .push(failure(Stage::ListTables, schema, &e));
                return self.check_policy(report);
            }
        };
        info!(count = tables.len(), schema = schema, "Found tables");

        let constraints = match source.list_constraints(schema).await {
            Ok(constraints) => constraints,
            Err(e) => {
                report
                    .failures
                    .push(failure(Stage::Constraint, schema, &e));
                self.check_policy(report)?;
                Vec::new()
            }
        };

        let order = order_tables(&tables, &constraints);
        if !order.cyclic.is_empty() {
            info!(tables = ?order.cyclic, "Foreign keys form a cycle; constraints are added after the copy");
        }
        report.cyclic_tables = order.cyclic;
        report.tables = order.tables.iter().map(TableReport::new).collect();

        let mut created = BTreeSet::new();
        for idx in 0..report.tables.len() {
            let table = report.tables[idx].table.clone();
            let created_table = self
                .copy_table(source, target, &table, &mut report.tables[idx])
                .await;
            if created_table {
                created.insert(table);
            }
            self.check_policy(report)?;
        }

        if self.settings.constraints.includes_deferred() {
            self.add_constraints(target, constraints, &created, report)
                .await?;
        }
        Ok(())
    }

    async fn copy_enum_types<S, T>(
        &self,
        source: &S,
        target: &T,
        report: &mut SyncReport,
    ) -> SyncResult<()>
    where
        S: SourceCatalog,
        T: TargetDatabase,
    {
        let schema = self.settings.schema.as_str();
        let enum_types = match source.list_enum_types(schema).await {
            Ok(types) => types,
            Err(e) => {
                report
                    .failures
                    .push(failure(Stage::EnumType, schema, &e));
                return self.check_policy(report);
            }
        };

        for enum_type in &enum_types {
            match target.recreate_enum(enum_type).await {
                Ok(()) => debug!(name = %enum_type.qualified_name(), "Recreated enum type"),
                Err(e) => {
                    warn!(name = %enum_type.qualified_name(), error = %e, "Failed to recreate enum type");
                    report.failures.push(failure(
                        Stage::EnumType,
                        enum_type.qualified_name(),
                        &e,
                    ));
                    self.check_policy(report)?;
                }
            }
        }
        Ok(())
    }

    /// Run the per-table pipeline. Returns whether the table was created.
    async fn copy_table<S, T>(
        &self,
        source: &S,
        target: &T,
        table: &str,
        table_report: &mut TableReport,
    ) -> bool
    where
        S: SourceCatalog,
        T: TargetDatabase,
    {
        let schema = self.settings.schema.as_str();
        let strict = self.settings.policy == FailurePolicy::Strict;

        // The table may not exist on the target yet
        if let Err(e) = target.drop_table(schema, table).await {
            debug!(table = table, error = %e, "Drop failed, continuing");
        }

        let descriptor = match source.describe_table(schema, table).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(table = table, error = %e, "Failed to describe table, skipping");
                table_report.status = TableStatus::Skipped;
                table_report
                    .failures
                    .push(failure(Stage::Describe, table, &e));
                return false;
            }
        };

        if let Err(e) = target
            .create_table(&descriptor, self.settings.constraints)
            .await
        {
            warn!(table = table, error = %e, "Failed to create table, skipping");
            table_report.status = TableStatus::Skipped;
            table_report.failures.push(failure(Stage::Create, table, &e));
            return false;
        }
        table_report.status = TableStatus::Copied;

        let rows = match source
            .fetch_rows(&descriptor, self.settings.row_limit, self.settings.stable_order)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = table, error = %e, "Failed to fetch rows");
                table_report.failures.push(failure(Stage::Fetch, table, &e));
                return true;
            }
        };
        table_report.rows_fetched = rows.len();

        for (idx, row) in rows.iter().enumerate() {
            match target.insert_row(&descriptor, row).await {
                Ok(()) => table_report.rows_inserted += 1,
                Err(e) => {
                    debug!(table = table, row = idx, error = %e, "Row insert failed");
                    table_report
                        .failures
                        .push(failure(Stage::Insert, table, &e).with_row(idx));
                    if strict {
                        return true;
                    }
                }
            }
        }

        if table_report.rows_inserted > 0 {
            self.reset_sequences(target, &descriptor, table_report).await;
        }

        info!(
            table = table,
            rows_fetched = table_report.rows_fetched,
            rows_inserted = table_report.rows_inserted,
            "Copied table"
        );
        true
    }

    async fn reset_sequences<T: TargetDatabase>(
        &self,
        target: &T,
        descriptor: &TableDescriptor,
        table_report: &mut TableReport,
    ) {
        for column in descriptor.columns.iter().filter(|c| c.owns_sequence()) {
            if let Err(e) = target.reset_sequence(descriptor, &column.name).await {
                warn!(table = %descriptor.table_name, column = %column.name, error = %e, "Failed to reset sequence");
                table_report.failures.push(failure(
                    Stage::Sequence,
                    format!("{}.{}", descriptor.table_name, column.name),
                    &e,
                ));
                if self.settings.policy == FailurePolicy::Strict {
                    return;
                }
            }
        }
    }

    async fn add_constraints<T: TargetDatabase>(
        &self,
        target: &T,
        mut constraints: Vec<TableConstraint>,
        created: &BTreeSet<String>,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        // Unique before check before foreign key, so referenced keys exist first
        constraints.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.table_name.cmp(&b.table_name))
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut added = 0usize;
        for constraint in &constraints {
            let owner_created = created.contains(&constraint.table_name);
            let reference_created = constraint
                .local_reference()
                .is_none_or(|referenced| created.contains(referenced));
            if !owner_created || !reference_created {
                debug!(constraint = %constraint.name, table = %constraint.table_name, "Skipping constraint");
                report.skipped_constraints.push(constraint.name.clone());
                continue;
            }

            match target.add_constraint(constraint).await {
                Ok(()) => added += 1,
                Err(e) => {
                    warn!(
                        constraint = %constraint.name,
                        kind = %constraint.kind,
                        error = %e,
                        "Failed to add constraint"
                    );
                    report
                        .failures
                        .push(failure(Stage::Constraint, constraint.name.as_str(), &e));
                    self.check_policy(report)?;
                }
            }
        }

        info!(
            added = added,
            skipped = report.skipped_constraints.len(),
            "Added deferred constraints"
        );
        Ok(())
    }

    /// Under the strict policy, turn the first recorded failure into an abort.
    fn check_policy(&self, report: &SyncReport) -> SyncResult<()> {
        if self.settings.policy != FailurePolicy::Strict {
            return Ok(());
        }
        match report.all_failures().next() {
            Some(first) => Err(SyncError::aborted(format!(
                "{} failed for {}: {}",
                first.stage, first.object, first.message
            ))),
            None => Ok(()),
        }
    }
}

fn failure(stage: Stage, object: impl Into<String>, err: &SyncError) -> StageFailure {
    StageFailure::new(stage, object, err.to_string()).with_sql_state(err.sql_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionEndpoint, EndpointRole};

    fn settings(policy: FailurePolicy) -> SyncSettings {
        let mut settings = SyncSettings::new(
            ConnectionEndpoint::parse(EndpointRole::Source, "postgres://u:p@remote/app").unwrap(),
            ConnectionEndpoint::parse(EndpointRole::Target, "postgres://localhost/test_db")
                .unwrap(),
            10,
        );
        settings.policy = policy;
        settings
    }

    #[test]
    fn test_best_effort_never_aborts() {
        let sync = Synchronizer::new(settings(FailurePolicy::BestEffort));
        let mut report = SyncReport::new("s", "t", "public", 10, FailurePolicy::BestEffort);
        report
            .failures
            .push(StageFailure::new(Stage::Create, "users", "boom"));
        assert!(sync.check_policy(&report).is_ok());
    }

    #[test]
    fn test_strict_aborts_on_first_failure() {
        let sync = Synchronizer::new(settings(FailurePolicy::Strict));
        let mut report = SyncReport::new("s", "t", "public", 10, FailurePolicy::Strict);
        assert!(sync.check_policy(&report).is_ok());

        let mut users = TableReport::new("users");
        users
            .failures
            .push(StageFailure::new(Stage::Insert, "users", "duplicate key").with_row(2));
        report.tables.push(users);

        let err = sync.check_policy(&report).unwrap_err();
        assert!(matches!(err, SyncError::Aborted { .. }));
        assert!(err.to_string().contains("insert failed for users"));
    }

    #[tokio::test]
    async fn test_sync_rejects_empty_source_before_connecting() {
        let err = sync("  ", None, 100).await.unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
