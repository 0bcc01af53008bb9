//! Schema-related data models.
//!
//! These are derived from the source catalog on every run and discarded once
//! the table they describe has been processed.

use serde::Serialize;

/// A row in text representation, one entry per column. `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// Rows fetched from one source table, at most `row_limit` of them.
pub type RowBatch = Vec<Row>;

/// Identity kind of a column (`pg_attribute.attidentity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    #[default]
    None,
    Always,
    ByDefault,
}

impl IdentityKind {
    /// Parse from the catalog's one-letter code.
    pub fn parse(code: &str) -> Self {
        match code {
            "a" => Self::Always,
            "d" => Self::ByDefault,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Full type as rendered by the catalog (e.g., `character varying(50)`, `numeric(10,2)`)
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub identity: IdentityKind,
    /// Expression of a stored generated column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_expression: Option<String>,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            identity: IdentityKind::None,
            generation_expression: None,
        }
    }

    /// Set the default expression.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Set the identity kind.
    pub fn with_identity(mut self, identity: IdentityKind) -> Self {
        self.identity = identity;
        self
    }

    /// Mark as a stored generated column.
    pub fn with_generation_expression(mut self, expression: impl Into<String>) -> Self {
        self.generation_expression = Some(expression.into());
        self
    }

    /// Generated columns are computed by the target and never copied.
    pub fn is_generated(&self) -> bool {
        self.generation_expression.is_some()
    }

    /// A `nextval(...)` default on an integer column, rendered as a serial type.
    pub fn serial_type(&self) -> Option<&'static str> {
        let default = self.default_value.as_deref()?;
        if !default.trim_start().starts_with("nextval(") {
            return None;
        }
        match self.data_type.as_str() {
            "smallint" => Some("smallserial"),
            "integer" => Some("serial"),
            "bigint" => Some("bigserial"),
            _ => None,
        }
    }

    /// Whether the target owns a sequence for this column after creation.
    pub fn owns_sequence(&self) -> bool {
        self.identity != IdentityKind::None || self.serial_type().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    /// Declared partitioned (`relkind = 'p'`); its rows live in the partitions
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partitioned: bool,
}

impl TableDescriptor {
    /// Create a new, column-less table descriptor.
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            partitioned: false,
        }
    }

    /// Add a column definition.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key columns.
    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    /// Mark the table as a partitioned parent.
    pub fn with_partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    /// Get the schema-qualified table name (unquoted, for display).
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    /// Columns that carry data between databases, in ordinal order.
    pub fn copyable_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.is_generated())
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Kind of constraint added after the data copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    Check,
    ForeignKey,
}

impl ConstraintKind {
    /// Parse from the catalog's `contype` code.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "u" => Some(Self::Unique),
            "c" => Some(Self::Check),
            "f" => Some(Self::ForeignKey),
            _ => None,
        }
    }

    /// Whether PostgreSQL can add this kind without checking existing rows.
    pub fn supports_not_valid(&self) -> bool {
        matches!(self, Self::Check | Self::ForeignKey)
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::Check => write!(f, "check"),
            Self::ForeignKey => write!(f, "foreign key"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableConstraint {
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    pub kind: ConstraintKind,
    /// Definition as rendered by `pg_get_constraintdef`
    pub definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
}

impl TableConstraint {
    /// Create a new constraint on `schema.table`.
    pub fn new(
        name: impl Into<String>,
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        kind: ConstraintKind,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            kind,
            definition: definition.into(),
            referenced_schema: None,
            referenced_table: None,
        }
    }

    /// Set the referenced table of a foreign key.
    pub fn with_reference(
        mut self,
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        self.referenced_schema = Some(schema_name.into());
        self.referenced_table = Some(table_name.into());
        self
    }

    /// Referenced table when it lives in the same schema (and is not the owner).
    pub fn local_reference(&self) -> Option<&str> {
        match (&self.referenced_schema, &self.referenced_table) {
            (Some(schema), Some(table))
                if *schema == self.schema_name && *table != self.table_name =>
            {
                Some(table)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumType {
    pub schema_name: String,
    pub type_name: String,
    pub labels: Vec<String>,
}

impl EnumType {
    /// Create a new enum type.
    pub fn new(
        schema_name: impl Into<String>,
        type_name: impl Into<String>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            type_name: type_name.into(),
            labels,
        }
    }

    /// Get the schema-qualified type name (unquoted, for display).
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.type_name)
    }
}
