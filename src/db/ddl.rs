//! SQL statement builders.
//!
//! Pure functions from descriptors to statement text. Names pass through
//! [`quote_ident`]; row values are never embedded and are bound as `$n`
//! parameters by the caller. Expressions taken from the catalog (defaults,
//! generation expressions, constraint definitions) are embedded as the server
//! rendered them; each statement is executed as a single prepared statement.

use crate::config::ConstraintMode;
use crate::db::ident::{quote_ident, quote_literal, quote_qualified, validate_type_name};
use crate::error::{SyncError, SyncResult};
use crate::models::{ColumnDefinition, EnumType, IdentityKind, TableConstraint, TableDescriptor};

/// `CREATE SCHEMA IF NOT EXISTS`.
pub fn create_schema(schema: &str) -> SyncResult<String> {
    Ok(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)?))
}

/// Cascading drop of a table that may not exist.
pub fn drop_table(schema: &str, table: &str) -> SyncResult<String> {
    Ok(format!(
        "DROP TABLE IF EXISTS {} CASCADE",
        quote_qualified(schema, table)?
    ))
}

/// Cascading drop of an enum type that may not exist.
pub fn drop_enum(enum_type: &EnumType) -> SyncResult<String> {
    Ok(format!(
        "DROP TYPE IF EXISTS {} CASCADE",
        quote_qualified(&enum_type.schema_name, &enum_type.type_name)?
    ))
}

/// `CREATE TYPE ... AS ENUM` with labels in sort order.
pub fn create_enum(enum_type: &EnumType) -> SyncResult<String> {
    let labels = enum_type
        .labels
        .iter()
        .map(|l| quote_literal(l))
        .collect::<SyncResult<Vec<_>>>()?;
    Ok(format!(
        "CREATE TYPE {} AS ENUM ({})",
        quote_qualified(&enum_type.schema_name, &enum_type.type_name)?,
        labels.join(", ")
    ))
}

/// Render one column of a `CREATE TABLE`.
pub fn column_definition(column: &ColumnDefinition) -> SyncResult<String> {
    let data_type = validate_type_name(&column.data_type)?;
    let mut sql = quote_ident(&column.name)?;
    sql.push(' ');

    if let Some(expression) = &column.generation_expression {
        check_expression(expression, &column.name)?;
        sql.push_str(data_type);
        sql.push_str(&format!(" GENERATED ALWAYS AS ({}) STORED", expression));
    } else if column.identity != IdentityKind::None {
        // BY DEFAULT so copied values can be inserted explicitly
        sql.push_str(data_type);
        sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
    } else if let Some(serial) = column.serial_type() {
        sql.push_str(serial);
    } else {
        sql.push_str(data_type);
        if let Some(default) = &column.default_value {
            check_expression(default, &column.name)?;
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
    }

    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    Ok(sql)
}

/// `CREATE TABLE` with columns in ordinal order and, depending on the mode,
/// an inline primary key.
pub fn create_table(table: &TableDescriptor, mode: ConstraintMode) -> SyncResult<String> {
    let mut items = table
        .columns
        .iter()
        .map(column_definition)
        .collect::<SyncResult<Vec<_>>>()?;

    if mode.includes_primary_key() && !table.primary_key.is_empty() {
        items.push(format!("PRIMARY KEY ({})", quoted_list(&table.primary_key)?));
    }

    let name = quote_qualified(&table.schema_name, &table.table_name)?;
    if items.is_empty() {
        return Ok(format!("CREATE TABLE {} ()", name));
    }
    Ok(format!("CREATE TABLE {} (\n    {}\n)", name, items.join(",\n    ")))
}

/// Select copyable columns as text, limited by the bound `$1`.
///
/// Plain tables are read with `ONLY` so rows of inheritance children are not
/// copied into the parent. A partitioned parent holds no rows of its own and
/// is read whole.
pub fn select_rows(table: &TableDescriptor, stable_order: bool) -> SyncResult<String> {
    let columns = table
        .copyable_columns()
        .map(|c| Ok(format!("{}::text", quote_ident(&c.name)?)))
        .collect::<SyncResult<Vec<_>>>()?;

    let mut sql = format!(
        "SELECT {} FROM {}{}",
        columns.join(", "),
        if table.partitioned { "" } else { "ONLY " },
        quote_qualified(&table.schema_name, &table.table_name)?
    );
    if stable_order && !table.primary_key.is_empty() {
        sql.push_str(&format!(" ORDER BY {}", quoted_list(&table.primary_key)?));
    }
    sql.push_str(" LIMIT $1");
    Ok(sql)
}

/// Insert one row; parameter `$n` is cast from text to the n-th copyable column's type.
pub fn insert_row(table: &TableDescriptor) -> SyncResult<String> {
    let name = quote_qualified(&table.schema_name, &table.table_name)?;
    let columns: Vec<&ColumnDefinition> = table.copyable_columns().collect();
    if columns.is_empty() {
        return Ok(format!("INSERT INTO {} DEFAULT VALUES", name));
    }

    let names = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<SyncResult<Vec<_>>>()?;
    let values = columns
        .iter()
        .enumerate()
        .map(|(i, c)| Ok(format!("${}::{}", i + 1, validate_type_name(&c.data_type)?)))
        .collect::<SyncResult<Vec<_>>>()?;

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        name,
        names.join(", "),
        values.join(", ")
    ))
}

/// Move the sequence owned by `column` past the largest copied value.
///
/// Binds: `$1` the quoted table name, `$2` the raw column name.
pub fn reset_sequence(table: &TableDescriptor, column: &str) -> SyncResult<String> {
    let col = quote_ident(column)?;
    Ok(format!(
        "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE(MAX({col}), 1), MAX({col}) IS NOT NULL) FROM {}",
        quote_qualified(&table.schema_name, &table.table_name)?
    ))
}

/// `ALTER TABLE ... ADD CONSTRAINT`, `NOT VALID` where the kind allows it.
pub fn add_constraint(constraint: &TableConstraint) -> SyncResult<String> {
    check_expression(&constraint.definition, &constraint.name)?;
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {}",
        quote_qualified(&constraint.schema_name, &constraint.table_name)?,
        quote_ident(&constraint.name)?,
        constraint.definition
    );
    if constraint.kind.supports_not_valid() && !constraint.definition.ends_with("NOT VALID") {
        sql.push_str(" NOT VALID");
    }
    Ok(sql)
}

fn quoted_list(names: &[String]) -> SyncResult<String> {
    Ok(names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<SyncResult<Vec<_>>>()?
        .join(", "))
}

fn check_expression(expression: &str, owner: &str) -> SyncResult<()> {
    if expression.trim().is_empty() || expression.contains('\0') {
        return Err(SyncError::invalid_identifier(
            owner,
            "catalog expression is empty or contains a NUL byte",
        ));
    }
    Ok(())
}
