//! Index directives.

/// A declarative index definition.
///
/// Indexes are always described declaratively rather than recovered from the
/// store's own index SQL, so a shadow rebuild can recreate them on the
/// replacement table without parsing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name, unique within the store.
    pub name: String,
    /// Table the index covers.
    pub table: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
}

impl IndexDef {
    /// Create an index definition over the given columns.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Render `CREATE INDEX IF NOT EXISTS` DDL.
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            self.name,
            self.table,
            self.columns.join(", ")
        )
    }
}
