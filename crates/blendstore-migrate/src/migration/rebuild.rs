//! Shadow table rebuilds.
//!
//! Emulates alterations the store cannot express in place (relaxing NOT
//! NULL, reordering or retargeting columns) by materializing the desired end
//! state as a new table, copying every row across, and swapping it in for
//! the original. Runs entirely inside the caller's transaction, so no
//! observer of the final table name ever sees an intermediate state.

use rusqlite::Connection;
use tracing::info;

use super::{ddl, introspect};
use crate::error::Error;
use crate::schema::{IndexDef, TableSchema};

/// Reserved suffix for shadow tables; no production table may use it.
const REBUILD_SUFFIX: &str = "__rebuild";

/// How rows are carried from the source table into the rebuilt one.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnMapping {
    /// Carry every target column over by name.
    ///
    /// Valid when the source already has all target columns; used when the
    /// change is purely a constraint relaxation or a column reordering.
    Straight,
    /// Explicit column-by-column list.
    ///
    /// Target columns without an entry are filled from their default (or
    /// null); used when the source predates a column of the target layout.
    Explicit(Vec<ColumnCopy>),
}

/// One entry of an explicit mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCopy {
    /// Target column receiving the value.
    pub target: String,
    /// Where the value comes from.
    pub source: CopySource,
}

/// Source of a copied value.
#[derive(Debug, Clone, PartialEq)]
pub enum CopySource {
    /// A source table column.
    Column(String),
    /// A literal or SQL expression evaluated per row.
    Expression(String),
}

impl ColumnCopy {
    /// Carry a source column into a target column.
    pub fn column(target: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: CopySource::Column(source.into()),
        }
    }

    /// Fill a target column from an SQL expression.
    pub fn expression(target: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: CopySource::Expression(expr.into()),
        }
    }
}

/// A recipe for rebuilding a table into a new shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildRecipe {
    /// Table the rows come from.
    pub source: String,
    /// Desired end state; its name is the final name after the swap.
    pub target: TableSchema,
    /// Row mapping.
    pub mapping: ColumnMapping,
    /// Indexes to recreate on the rebuilt table.
    pub indexes: Vec<IndexDef>,
}

impl RebuildRecipe {
    /// Rebuild a table in place under a new shape with a straight copy.
    pub fn in_place(target: TableSchema) -> Self {
        Self {
            source: target.name.clone(),
            target,
            mapping: ColumnMapping::Straight,
            indexes: Vec::new(),
        }
    }

    /// Set an explicit column mapping.
    pub fn with_mapping(mut self, copies: Vec<ColumnCopy>) -> Self {
        self.mapping = ColumnMapping::Explicit(copies);
        self
    }

    /// Add an index to recreate after the swap.
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Validate the recipe against the source table's current shape.
    ///
    /// Pure inspection, run before any DDL executes: a failure here can
    /// never leave the store inconsistent. Checks that the mapping supplies
    /// a value for every NOT NULL target column (or the column has a
    /// default), and that every referenced source column exists.
    pub fn validate(&self, source: &TableSchema) -> Result<(), Error> {
        let fail = |message: String| {
            Err(Error::RecipeValidation {
                table: self.target.name.clone(),
                message,
            })
        };

        match &self.mapping {
            ColumnMapping::Straight => {
                for column in &self.target.columns {
                    if !source.has_column(&column.name) {
                        return fail(format!(
                            "straight mapping needs source column '{}'",
                            column.name
                        ));
                    }
                }
            }
            ColumnMapping::Explicit(copies) => {
                let mut covered = Vec::with_capacity(copies.len());
                for copy in copies {
                    if !self.target.has_column(&copy.target) {
                        return fail(format!("mapping targets unknown column '{}'", copy.target));
                    }
                    if covered.contains(&copy.target.as_str()) {
                        return fail(format!("column '{}' mapped twice", copy.target));
                    }
                    covered.push(copy.target.as_str());
                    if let CopySource::Column(name) = &copy.source {
                        if !source.has_column(name) {
                            return fail(format!("mapping reads missing source column '{name}'"));
                        }
                    }
                }
                for column in &self.target.columns {
                    if !covered.contains(&column.name.as_str()) && !column.accepts_missing_value() {
                        return fail(format!(
                            "NOT NULL column '{}' has no mapped value and no default",
                            column.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn copy_sql(&self, temp: &str) -> String {
        match &self.mapping {
            ColumnMapping::Straight => {
                let names = self.target.column_names().join(", ");
                format!(
                    "INSERT INTO {temp} ({names}) SELECT {names} FROM {}",
                    self.source
                )
            }
            ColumnMapping::Explicit(copies) => {
                let targets: Vec<&str> = copies.iter().map(|c| c.target.as_str()).collect();
                let sources: Vec<&str> = copies
                    .iter()
                    .map(|c| match &c.source {
                        CopySource::Column(name) => name.as_str(),
                        CopySource::Expression(expr) => expr.as_str(),
                    })
                    .collect();
                format!(
                    "INSERT INTO {temp} ({}) SELECT {} FROM {}",
                    targets.join(", "),
                    sources.join(", "),
                    self.source
                )
            }
        }
    }
}

/// Outcome of a completed rebuild.
#[derive(Debug, Clone, Copy)]
pub struct RebuildOutcome {
    /// Number of rows carried into the rebuilt table.
    pub rows_copied: usize,
}

/// Execute a rebuild recipe.
///
/// The sequence — create shadow, copy, drop original, rename, reindex —
/// must run inside an open transaction so a failure at any point rolls the
/// whole swap back.
pub fn execute(conn: &Connection, recipe: &RebuildRecipe) -> Result<RebuildOutcome, Error> {
    let source = introspect::describe_table(conn, &recipe.source)?.ok_or_else(|| {
        Error::TableNotFound {
            table: recipe.source.clone(),
        }
    })?;
    recipe.validate(&source)?;

    let temp = format!("{}{}", recipe.target.name, REBUILD_SUFFIX);
    // A leftover shadow can only exist if a previous process died outside a
    // transaction; the suffix is reserved, so dropping it is safe.
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {temp}"))?;
    conn.execute_batch(&recipe.target.create_sql_as(&temp, false))?;

    let rows_copied = conn.execute(&recipe.copy_sql(&temp), [])?;

    conn.execute_batch(&format!("DROP TABLE {}", recipe.source))?;
    conn.execute_batch(&format!(
        "ALTER TABLE {temp} RENAME TO {}",
        recipe.target.name
    ))?;

    for index in &recipe.indexes {
        ddl::create_index_if_absent(conn, index)?;
    }

    info!(
        table = %recipe.target.name,
        rows = rows_copied,
        "rebuilt table via shadow swap"
    );
    Ok(RebuildOutcome { rows_copied })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};
    use crate::store::Store;

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TABLE samples (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    label VARCHAR(50) NOT NULL,
                    grade INTEGER
                 );
                 INSERT INTO samples (label, grade) VALUES ('alpha', 1), ('beta', 2), ('gamma', 3);",
            )
            .unwrap();
        store
    }

    fn relaxed_target() -> TableSchema {
        TableSchema::new("samples")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement())
            .with_column(Column::new("label", ColumnType::Varchar(50)))
            .with_column(Column::new("grade", ColumnType::Integer))
    }

    #[test]
    fn test_straight_rebuild_preserves_rows() {
        let mut store = seeded_store();
        let recipe = RebuildRecipe::in_place(relaxed_target());

        let tx = store.transaction().unwrap();
        let outcome = execute(&tx, &recipe).unwrap();
        tx.commit().unwrap();

        assert_eq!(outcome.rows_copied, 3);
        let labels: Vec<(i64, String)> = store
            .conn()
            .prepare("SELECT id, label FROM samples ORDER BY id")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            labels,
            vec![(1, "alpha".into()), (2, "beta".into()), (3, "gamma".into())]
        );

        // the constraint is actually relaxed
        store
            .conn()
            .execute("INSERT INTO samples (label) VALUES (NULL)", [])
            .unwrap();
    }

    #[test]
    fn test_explicit_rebuild_interleaves_new_column() {
        let mut store = seeded_store();
        let target = TableSchema::new("samples")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement())
            .with_column(Column::new("batch_no", ColumnType::Integer))
            .with_column(Column::new("label", ColumnType::Varchar(50)).not_null())
            .with_column(Column::new("grade", ColumnType::Integer));
        let recipe = RebuildRecipe {
            source: "samples".into(),
            target,
            mapping: ColumnMapping::Explicit(vec![
                ColumnCopy::column("id", "id"),
                ColumnCopy::column("label", "label"),
                ColumnCopy::column("grade", "grade"),
            ]),
            indexes: vec![IndexDef::new("idx_samples_label", "samples", &["label"])],
        };

        let tx = store.transaction().unwrap();
        let outcome = execute(&tx, &recipe).unwrap();
        tx.commit().unwrap();
        assert_eq!(outcome.rows_copied, 3);

        let schema = introspect::describe_table(store.conn(), "samples")
            .unwrap()
            .unwrap();
        assert_eq!(schema.column_names(), vec!["id", "batch_no", "label", "grade"]);
        assert!(introspect::index_exists(store.conn(), "idx_samples_label").unwrap());

        let batch_no: Option<i64> = store
            .conn()
            .query_row("SELECT batch_no FROM samples WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(batch_no, None);
    }

    #[test]
    fn test_straight_mapping_requires_all_source_columns() {
        let store = seeded_store();
        let target = relaxed_target().with_column(Column::new("extra", ColumnType::Text));
        let recipe = RebuildRecipe::in_place(target);

        let source = introspect::describe_table(store.conn(), "samples")
            .unwrap()
            .unwrap();
        assert!(matches!(
            recipe.validate(&source),
            Err(Error::RecipeValidation { .. })
        ));
    }

    #[test]
    fn test_uncovered_not_null_column_rejected() {
        let store = seeded_store();
        let target = relaxed_target().with_column(Column::new("lot", ColumnType::Text).not_null());
        let recipe = RebuildRecipe {
            source: "samples".into(),
            target,
            mapping: ColumnMapping::Explicit(vec![
                ColumnCopy::column("id", "id"),
                ColumnCopy::column("label", "label"),
            ]),
            indexes: Vec::new(),
        };

        let source = introspect::describe_table(store.conn(), "samples")
            .unwrap()
            .unwrap();
        let err = recipe.validate(&source).unwrap_err();
        assert!(err.to_string().contains("lot"));
    }

    #[test]
    fn test_validation_failure_leaves_store_untouched() {
        let mut store = seeded_store();
        let target = relaxed_target().with_column(Column::new("extra", ColumnType::Text));
        let recipe = RebuildRecipe::in_place(target);

        let tx = store.transaction().unwrap();
        assert!(execute(&tx, &recipe).is_err());
        drop(tx);

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM samples", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
        assert!(!introspect::table_exists(store.conn(), "samples__rebuild").unwrap());
    }

    #[test]
    fn test_missing_source_table() {
        let mut store = Store::open_in_memory().unwrap();
        let recipe = RebuildRecipe::in_place(relaxed_target());
        let tx = store.transaction().unwrap();
        assert!(matches!(
            execute(&tx, &recipe),
            Err(Error::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_expression_mapping_fills_literal() {
        let mut store = seeded_store();
        let target = relaxed_target().with_column(Column::new("origin", ColumnType::Text));
        let recipe = RebuildRecipe {
            source: "samples".into(),
            target,
            mapping: ColumnMapping::Explicit(vec![
                ColumnCopy::column("id", "id"),
                ColumnCopy::column("label", "label"),
                ColumnCopy::column("grade", "grade"),
                ColumnCopy::expression("origin", "'legacy'"),
            ]),
            indexes: Vec::new(),
        };

        let tx = store.transaction().unwrap();
        execute(&tx, &recipe).unwrap();
        tx.commit().unwrap();

        let origin: String = store
            .conn()
            .query_row("SELECT origin FROM samples WHERE id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(origin, "legacy");
    }
}
