//! Sync report models.
//!
//! A report is assembled while the run progresses and printed at the end,
//! either as a log summary or as JSON on stdout.

use crate::config::FailurePolicy;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Pipeline stage at which a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ListTables,
    EnumType,
    Describe,
    Create,
    Fetch,
    Insert,
    Sequence,
    Constraint,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ListTables => "list_tables",
            Self::EnumType => "enum_type",
            Self::Describe => "describe",
            Self::Create => "create",
            Self::Fetch => "fetch",
            Self::Insert => "insert",
            Self::Sequence => "sequence",
            Self::Constraint => "constraint",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    /// Table, type or constraint the failure belongs to
    pub object: String,
    pub message: String,
    /// Zero-based index of the row within the fetched batch (insert failures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// SQLSTATE reported by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
}

impl StageFailure {
    /// Create a new failure record.
    pub fn new(stage: Stage, object: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            object: object.into(),
            message: message.into(),
            row: None,
            sql_state: None,
        }
    }

    /// Attach the failing row's index.
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Attach the server's SQLSTATE, if there is one.
    pub fn with_sql_state(mut self, sql_state: Option<&str>) -> Self {
        self.sql_state = sql_state.map(String::from);
        self
    }
}

/// Final state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Created on the target; rows were copied (possibly with per-row failures)
    Copied,
    /// Describe or create failed; no data was copied
    Skipped,
    /// Not reached because a strict run aborted first
    NotProcessed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub status: TableStatus,
    pub rows_fetched: usize,
    pub rows_inserted: usize,
    pub failures: Vec<StageFailure>,
}

impl TableReport {
    /// Create a report for a table that has not been processed yet.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            status: TableStatus::NotProcessed,
            rows_fetched: 0,
            rows_inserted: 0,
            failures: Vec::new(),
        }
    }

    /// Check if any stage of this table failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Masked source URL
    pub source: String,
    /// Masked target URL
    pub target: String,
    pub schema: String,
    pub row_limit: u32,
    pub policy: FailurePolicy,
    pub tables: Vec<TableReport>,
    /// Failures not tied to a single table's pipeline (enum types, deferred constraints)
    pub failures: Vec<StageFailure>,
    /// Tables whose foreign keys form a cycle
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cyclic_tables: Vec<String>,
    /// Deferred constraints not attempted because a table they need was not created
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_constraints: Vec<String>,
    pub aborted: bool,
}

impl SyncReport {
    /// Create an empty report for a run that is about to start.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        schema: impl Into<String>,
        row_limit: u32,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            source: source.into(),
            target: target.into(),
            schema: schema.into(),
            row_limit,
            policy,
            tables: Vec::new(),
            failures: Vec::new(),
            cyclic_tables: Vec::new(),
            skipped_constraints: Vec::new(),
            aborted: false,
        }
    }

    /// Mark the run as finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Look up a table's report by name.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Every recorded failure, table-level and run-level.
    pub fn all_failures(&self) -> impl Iterator<Item = &StageFailure> {
        self.tables
            .iter()
            .flat_map(|t| t.failures.iter())
            .chain(self.failures.iter())
    }

    /// Total number of recorded failures.
    pub fn failure_count(&self) -> usize {
        self.all_failures().count()
    }

    /// Check if anything failed.
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Number of tables created and copied.
    pub fn tables_copied(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Copied)
            .count()
    }

    /// Number of tables skipped because describe or create failed.
    pub fn tables_skipped(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Skipped)
            .count()
    }

    /// Total rows inserted across all tables.
    pub fn rows_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.rows_inserted).sum()
    }

    /// Run duration in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| end.signed_duration_since(self.started_at).num_milliseconds())
    }

    /// Process exit status for a run that completed with this report.
    pub fn exit_code(&self) -> i32 {
        if self.aborted || (self.policy == FailurePolicy::Strict && self.has_failures()) {
            1
        } else {
            0
        }
    }
}
