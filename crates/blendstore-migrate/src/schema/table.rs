//! Table schema definitions.

use super::column::Column;

/// An ordered description of a table's columns.
///
/// Built declaratively for migration targets, or read from the live store by
/// the introspector. Introspected schemas are always read fresh; a
/// `TableSchema` is never reused across a mutation of its table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column, assigning its ordinal position.
    pub fn with_column(mut self, mut column: Column) -> Self {
        column.position = self.columns.len();
        self.columns.push(column);
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table has a column with the given name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Render `CREATE TABLE` DDL under this schema's own name.
    pub fn create_sql(&self, if_not_exists: bool) -> String {
        self.create_sql_as(&self.name, if_not_exists)
    }

    /// Render `CREATE TABLE` DDL under a different table name.
    ///
    /// Used by the shadow rebuilder, which materializes the target shape
    /// under a temporary name before swapping it in.
    pub fn create_sql_as(&self, name: &str, if_not_exists: bool) -> String {
        let clause = if if_not_exists {
            "CREATE TABLE IF NOT EXISTS"
        } else {
            "CREATE TABLE"
        };
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.sql()))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("{clause} {name} (\n{columns}\n)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, DefaultExpr};

    #[test]
    fn test_positions_are_contiguous() {
        let schema = TableSchema::new("recipe")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement())
            .with_column(Column::new("product_name", ColumnType::Varchar(100)).not_null())
            .with_column(Column::new("ratio", ColumnType::Decimal(5, 2)));

        let positions: Vec<usize> = schema.columns.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_column_lookup() {
        let schema = TableSchema::new("recipe")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement());

        assert!(schema.has_column("id"));
        assert!(!schema.has_column("is_main"));
    }

    #[test]
    fn test_create_sql() {
        let schema = TableSchema::new("blending_order")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement())
            .with_column(
                Column::new("status", ColumnType::Varchar(20))
                    .with_default(DefaultExpr::Text("in_progress".into())),
            );

        let sql = schema.create_sql(true);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS blending_order ("));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("status VARCHAR(20) DEFAULT 'in_progress'"));
    }

    #[test]
    fn test_create_sql_as_temporary_name() {
        let schema = TableSchema::new("blending_work")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement());

        let sql = schema.create_sql_as("blending_work__rebuild", false);
        assert!(sql.starts_with("CREATE TABLE blending_work__rebuild ("));
    }
}
