//! Direct DDL application.
//!
//! The subset of schema operations the store supports natively. Everything
//! outside the capability set declared here routes to the shadow rebuilder.

use rusqlite::Connection;
use tracing::debug;

use super::introspect;
use crate::error::Error;
use crate::schema::{Column, IndexDef, TableSchema};

/// Create a table if it does not already exist.
///
/// Returns whether DDL actually ran. The schema description carries primary
/// key, uniqueness, and foreign-key clauses, so a single declarative create
/// yields the complete shape.
pub fn create_table_if_absent(conn: &Connection, schema: &TableSchema) -> Result<bool, Error> {
    if introspect::table_exists(conn, &schema.name)? {
        return Ok(false);
    }
    debug!(table = %schema.name, "creating table");
    conn.execute_batch(&schema.create_sql(true))?;
    Ok(true)
}

/// Create an index if no index of that name exists.
pub fn create_index_if_absent(conn: &Connection, index: &IndexDef) -> Result<bool, Error> {
    if introspect::index_exists(conn, &index.name)? {
        return Ok(false);
    }
    debug!(index = %index.name, table = %index.table, "creating index");
    conn.execute_batch(&index.create_sql())?;
    Ok(true)
}

/// Why a column cannot be added through the store's direct ALTER path.
///
/// SQLite accepts `ALTER TABLE ... ADD COLUMN` only for columns that are not
/// PRIMARY KEY or UNIQUE, whose default (if any) is a constant, that carry a
/// constant default when NOT NULL, and whose foreign key (if any) defaults
/// to null.
pub fn add_column_unsupported(column: &Column) -> Option<&'static str> {
    if column.primary_key {
        return Some("cannot add a PRIMARY KEY column");
    }
    if column.unique {
        return Some("cannot add a UNIQUE column");
    }
    if let Some(default) = &column.default {
        if !default.is_constant() {
            return Some("added column default must be a constant");
        }
    }
    if column.not_null && column.default.is_none() {
        return Some("NOT NULL column needs a constant default");
    }
    if column.reference.is_some() && (column.not_null || column.default.is_some()) {
        return Some("added foreign key column must default to null");
    }
    None
}

/// Add a column if it does not already exist.
///
/// Returns whether DDL actually ran. Errors with
/// [`Error::TableNotFound`] when the table is absent and
/// [`Error::UnsupportedAlter`] when the addition is outside the direct
/// capability set (see [`add_column_unsupported`]).
pub fn add_column_if_absent(conn: &Connection, table: &str, column: &Column) -> Result<bool, Error> {
    if !introspect::table_exists(conn, table)? {
        return Err(Error::TableNotFound {
            table: table.to_string(),
        });
    }
    if introspect::column_exists(conn, table, &column.name)? {
        return Ok(false);
    }
    if let Some(reason) = add_column_unsupported(column) {
        return Err(Error::UnsupportedAlter {
            table: table.to_string(),
            column: column.name.clone(),
            reason: reason.to_string(),
        });
    }
    debug!(table = %table, column = %column.name, "adding column");
    conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {}", table, column.sql()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, DefaultExpr, DeleteBehavior};
    use crate::store::Store;

    #[test]
    fn test_create_table_twice_is_noop() {
        let store = Store::open_in_memory().unwrap();
        let schema = TableSchema::new("recipe")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement())
            .with_column(Column::new("product_name", ColumnType::Varchar(100)).not_null());

        assert!(create_table_if_absent(store.conn(), &schema).unwrap());
        assert!(!create_table_if_absent(store.conn(), &schema).unwrap());
    }

    #[test]
    fn test_create_index_twice_is_noop() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute_batch("CREATE TABLE recipe (id INTEGER PRIMARY KEY, product_name TEXT)")
            .unwrap();
        let idx = IndexDef::new("idx_recipe_product", "recipe", &["product_name"]);

        assert!(create_index_if_absent(store.conn(), &idx).unwrap());
        assert!(!create_index_if_absent(store.conn(), &idx).unwrap());
    }

    #[test]
    fn test_add_column_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute_batch("CREATE TABLE recipe (id INTEGER PRIMARY KEY)")
            .unwrap();
        let col = Column::new("is_main", ColumnType::Boolean).with_default(DefaultExpr::Int(0));

        assert!(add_column_if_absent(store.conn(), "recipe", &col).unwrap());
        assert!(!add_column_if_absent(store.conn(), "recipe", &col).unwrap());
        assert!(introspect::column_exists(store.conn(), "recipe", "is_main").unwrap());
    }

    #[test]
    fn test_add_column_to_missing_table() {
        let store = Store::open_in_memory().unwrap();
        let col = Column::new("is_main", ColumnType::Boolean);
        assert!(matches!(
            add_column_if_absent(store.conn(), "recipe", &col),
            Err(Error::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_capability_rules() {
        assert!(add_column_unsupported(&Column::new("a", ColumnType::Integer)).is_none());
        assert!(add_column_unsupported(
            &Column::new("a", ColumnType::Integer).with_default(DefaultExpr::Int(0))
        )
        .is_none());

        assert!(add_column_unsupported(&Column::new("a", ColumnType::Integer).unique()).is_some());
        assert!(
            add_column_unsupported(&Column::new("a", ColumnType::Integer).primary_key()).is_some()
        );
        assert!(add_column_unsupported(&Column::new("a", ColumnType::Integer).not_null()).is_some());
        assert!(add_column_unsupported(
            &Column::new("a", ColumnType::Timestamp).with_default(DefaultExpr::CurrentTimestamp)
        )
        .is_some());
        assert!(add_column_unsupported(
            &Column::new("a", ColumnType::Integer)
                .with_default(DefaultExpr::Int(1))
                .references("parent", "id", DeleteBehavior::SetNull)
        )
        .is_some());
        assert!(add_column_unsupported(&Column::new("a", ColumnType::Integer).references(
            "parent",
            "id",
            DeleteBehavior::SetNull
        ))
        .is_none());
    }

    #[test]
    fn test_unsupported_add_surfaces_reason() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();
        let col = Column::new("lot", ColumnType::Varchar(50)).unique();

        match add_column_if_absent(store.conn(), "t", &col) {
            Err(Error::UnsupportedAlter { reason, .. }) => assert!(reason.contains("UNIQUE")),
            other => panic!("expected UnsupportedAlter, got {other:?}"),
        }
    }
}
