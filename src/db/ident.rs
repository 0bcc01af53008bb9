//! Identifier and literal quoting.
//!
//! Catalog-derived names are never concatenated into SQL as-is. Names are
//! validated and rendered as quoted identifiers; declared column types, which
//! cannot be quoted as a whole, are checked against a character allow-list.

use crate::error::{SyncError, SyncResult};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// Validate a catalog name and render it as a quoted identifier.
pub fn quote_ident(name: &str) -> SyncResult<String> {
    if name.is_empty() {
        return Err(SyncError::invalid_identifier(name, "identifier is empty"));
    }
    if name.contains('\0') {
        return Err(SyncError::invalid_identifier(
            name,
            "identifier contains a NUL byte",
        ));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(SyncError::invalid_identifier(
            name,
            format!("identifier exceeds {} bytes", MAX_IDENTIFIER_BYTES),
        ));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Render `schema.name` with both parts quoted.
pub fn quote_qualified(schema: &str, name: &str) -> SyncResult<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(name)?))
}

/// Render a string as a standard-conforming SQL literal.
pub fn quote_literal(value: &str) -> SyncResult<String> {
    if value.contains('\0') {
        return Err(SyncError::invalid_identifier(
            value,
            "literal contains a NUL byte",
        ));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Check a declared type as rendered by `format_type`.
///
/// Accepts names, modifiers, array brackets, quoted user type names and
/// schema qualification, e.g. `character varying(50)`, `numeric(10,2)`,
/// `timestamp(3) with time zone`, `integer[]`, `"Mood"`, `billing."Money"`.
pub fn validate_type_name(data_type: &str) -> SyncResult<&str> {
    if data_type.trim().is_empty() {
        return Err(SyncError::invalid_identifier(data_type, "type name is empty"));
    }

    let mut in_quotes = false;
    for c in data_type.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            _ if in_quotes => {
                if c == '\0' {
                    return Err(SyncError::invalid_identifier(
                        data_type,
                        "type name contains a NUL byte",
                    ));
                }
            }
            c if c.is_alphanumeric() => {}
            '_' | ' ' | '(' | ')' | ',' | '[' | ']' | '.' | '$' => {}
            _ => {
                return Err(SyncError::invalid_identifier(
                    data_type,
                    format!("unexpected character {:?} in type name", c),
                ));
            }
        }
    }
    if in_quotes {
        return Err(SyncError::invalid_identifier(
            data_type,
            "unbalanced quotes in type name",
        ));
    }
    Ok(data_type)
}
