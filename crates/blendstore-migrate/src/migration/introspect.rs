//! Schema introspection.
//!
//! Reads the live structure of tables straight from the store. Nothing here
//! is cached: every migration step begins by re-reading state, because steps
//! may run against databases at different historical versions.

use rusqlite::Connection;

use crate::error::Error;
use crate::schema::{Column, ColumnType, DefaultExpr, DeleteBehavior, TableSchema};

/// Whether a table with the given name exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether an index with the given name exists.
pub fn index_exists(conn: &Connection, index: &str) -> Result<bool, Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        [index],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Describe the current on-disk definition of a table.
///
/// Returns `None` when the table does not exist. Column descriptors carry
/// name, declared type, nullability, default, primary key, and ordinal
/// position; foreign keys and single-column UNIQUE constraints are recovered
/// so a rebuilt table keeps them.
pub fn describe_table(conn: &Connection, table: &str) -> Result<Option<TableSchema>, Error> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }

    let mut schema = TableSchema::new(table);
    let autoincrement = declares_autoincrement(conn, table)?;

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| {
        Ok(RawColumn {
            name: row.get(1)?,
            declared_type: row.get(2)?,
            not_null: row.get::<_, i64>(3)? != 0,
            default: row.get(4)?,
            primary_key: row.get::<_, i64>(5)? != 0,
        })
    })?;

    for raw in rows {
        let raw = raw?;
        let mut column = Column::new(&raw.name, ColumnType::parse(&raw.declared_type));
        column.not_null = raw.not_null;
        column.default = raw.default.as_deref().map(parse_default);
        column.primary_key = raw.primary_key;
        column.autoincrement = raw.primary_key && autoincrement;
        schema = schema.with_column(column);
    }

    attach_foreign_keys(conn, &mut schema)?;
    attach_unique_columns(conn, &mut schema)?;

    Ok(Some(schema))
}

/// Whether a column exists on the given table (false when the table is absent).
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, Error> {
    match describe_table(conn, table)? {
        Some(schema) => Ok(schema.has_column(column)),
        None => Ok(false),
    }
}

/// Whether a column accepts nulls.
///
/// Errors when the table or the column does not exist.
pub fn is_nullable(conn: &Connection, table: &str, column: &str) -> Result<bool, Error> {
    let schema = describe_table(conn, table)?.ok_or_else(|| Error::TableNotFound {
        table: table.to_string(),
    })?;
    let col = schema.column(column).ok_or_else(|| Error::ColumnNotFound {
        table: table.to_string(),
        column: column.to_string(),
    })?;
    Ok(!col.not_null)
}

struct RawColumn {
    name: String,
    declared_type: String,
    not_null: bool,
    default: Option<String>,
    primary_key: bool,
}

/// Quote an identifier for interpolation into PRAGMA statements, which do
/// not accept bound parameters.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn declares_autoincrement(conn: &Connection, table: &str) -> Result<bool, Error> {
    let sql: Option<String> = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(sql
        .map(|s| s.to_ascii_uppercase().contains("AUTOINCREMENT"))
        .unwrap_or(false))
}

/// Interpret the raw default text reported by the store.
fn parse_default(raw: &str) -> DefaultExpr {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
        return DefaultExpr::CurrentTimestamp;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return DefaultExpr::Int(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return DefaultExpr::Real(v);
    }
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        return DefaultExpr::Text(trimmed[1..trimmed.len() - 1].replace("''", "'"));
    }
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);
    DefaultExpr::Expression(inner.to_string())
}

fn attach_foreign_keys(conn: &Connection, schema: &mut TableSchema) -> Result<(), Error> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA foreign_key_list({})",
        quote_ident(&schema.name)
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(2)?,         // referenced table
            row.get::<_, String>(3)?,         // local column
            row.get::<_, Option<String>>(4)?, // referenced column
            row.get::<_, String>(6)?,         // on_delete
        ))
    })?;

    for row in rows {
        let (parent, local, to, on_delete) = row?;
        if let Some(column) = schema.columns.iter_mut().find(|c| c.name == local) {
            // Implicit references resolve to the parent's id primary key.
            let to = to.unwrap_or_else(|| "id".to_string());
            let behavior = match on_delete.as_str() {
                "CASCADE" => DeleteBehavior::Cascade,
                "SET NULL" => DeleteBehavior::SetNull,
                _ => DeleteBehavior::Restrict,
            };
            *column = column.clone().references(parent, to, behavior);
        }
    }
    Ok(())
}

fn attach_unique_columns(conn: &Connection, schema: &mut TableSchema) -> Result<(), Error> {
    let mut list = conn.prepare(&format!("PRAGMA index_list({})", quote_ident(&schema.name)))?;
    let indexes = list.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?, // index name
            row.get::<_, i64>(2)?,    // unique
            row.get::<_, String>(3)?, // origin: 'u' = UNIQUE constraint
        ))
    })?;

    let unique_indexes: Vec<String> = indexes
        .filter_map(|r| r.ok())
        .filter(|(_, unique, origin)| *unique != 0 && origin == "u")
        .map(|(name, _, _)| name)
        .collect();

    for index in unique_indexes {
        let mut info = conn.prepare(&format!("PRAGMA index_info({})", quote_ident(&index)))?;
        let covered: Vec<String> = info
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<Result<_, _>>()?;
        if let [only] = covered.as_slice() {
            if let Some(column) = schema.columns.iter_mut().find(|c| &c.name == only) {
                column.unique = true;
            }
        }
    }
    Ok(())
}
