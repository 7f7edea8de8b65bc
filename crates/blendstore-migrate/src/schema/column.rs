//! Column descriptors for table schemas.

/// Declared SQL type of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer.
    Integer,
    /// Floating point.
    Real,
    /// Unbounded text.
    Text,
    /// Boolean (stored as 0/1).
    Boolean,
    /// Length-hinted text.
    Varchar(u16),
    /// Fixed-point decimal with precision and scale.
    Decimal(u8, u8),
    /// Calendar date.
    Date,
    /// Timestamp.
    Timestamp,
    /// A declared type the engine does not model.
    Other(String),
}

impl ColumnType {
    /// Parse a declared type string as reported by the store.
    pub fn parse(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        match upper.as_str() {
            "INTEGER" | "INT" => return ColumnType::Integer,
            "REAL" | "FLOAT" | "DOUBLE" => return ColumnType::Real,
            "TEXT" => return ColumnType::Text,
            "BOOLEAN" => return ColumnType::Boolean,
            "DATE" => return ColumnType::Date,
            "TIMESTAMP" | "DATETIME" => return ColumnType::Timestamp,
            _ => {}
        }

        if let Some(args) = parenthesized(&upper, "VARCHAR") {
            if let Ok(len) = args.trim().parse() {
                return ColumnType::Varchar(len);
            }
        }
        if let Some(args) = parenthesized(&upper, "DECIMAL") {
            let mut parts = args.split(',');
            if let (Some(p), Some(s)) = (parts.next(), parts.next()) {
                if let (Ok(p), Ok(s)) = (p.trim().parse(), s.trim().parse()) {
                    return ColumnType::Decimal(p, s);
                }
            }
        }

        ColumnType::Other(declared.trim().to_string())
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::Real => write!(f, "REAL"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Varchar(len) => write!(f, "VARCHAR({len})"),
            ColumnType::Decimal(p, s) => write!(f, "DECIMAL({p},{s})"),
            ColumnType::Date => write!(f, "DATE"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Other(decl) => write!(f, "{decl}"),
        }
    }
}

/// Extract the argument list of `NAME(args)` if `upper` has that shape.
fn parenthesized<'a>(upper: &'a str, name: &str) -> Option<&'a str> {
    upper
        .strip_prefix(name)?
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Default value expression for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultExpr {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Real(f64),
    /// String literal.
    Text(String),
    /// Current timestamp, evaluated at insert time.
    CurrentTimestamp,
    /// Arbitrary SQL expression, evaluated at insert time.
    Expression(String),
}

impl DefaultExpr {
    /// Whether the store treats this default as a constant.
    ///
    /// SQLite only accepts constant defaults in `ALTER TABLE ... ADD COLUMN`.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            DefaultExpr::Int(_) | DefaultExpr::Real(_) | DefaultExpr::Text(_)
        )
    }

    /// Render the expression for a `DEFAULT` clause.
    pub fn sql(&self) -> String {
        match self {
            DefaultExpr::Int(v) => v.to_string(),
            DefaultExpr::Real(v) => v.to_string(),
            DefaultExpr::Text(v) => format!("'{}'", v.replace('\'', "''")),
            DefaultExpr::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            DefaultExpr::Expression(expr) => format!("({expr})"),
        }
    }
}

/// Behavior when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    /// Delete referencing rows.
    Cascade,
    /// Prevent deletion while referencing rows exist.
    Restrict,
    /// Set the referencing column to null.
    SetNull,
}

impl std::fmt::Display for DeleteBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteBehavior::Cascade => write!(f, "CASCADE"),
            DeleteBehavior::Restrict => write!(f, "RESTRICT"),
            DeleteBehavior::SetNull => write!(f, "SET NULL"),
        }
    }
}

/// A column-level foreign key clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct References {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Action taken when the referenced row is deleted.
    pub on_delete: DeleteBehavior,
}

impl References {
    fn sql(&self) -> String {
        format!(
            "REFERENCES {}({}) ON DELETE {}",
            self.table, self.column, self.on_delete
        )
    }
}

/// A column within a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Declared type.
    pub column_type: ColumnType,
    /// Whether the column rejects nulls.
    pub not_null: bool,
    /// Default value, if any.
    pub default: Option<DefaultExpr>,
    /// Whether the column is the table's primary key.
    pub primary_key: bool,
    /// Whether the primary key autoincrements.
    pub autoincrement: bool,
    /// Whether the column carries a UNIQUE constraint.
    pub unique: bool,
    /// Column-level foreign key, if any.
    pub reference: Option<References>,
    /// Ordinal position within the table, contiguous from 0.
    ///
    /// Maintained by [`TableSchema`](super::TableSchema); stable for the
    /// lifetime of a table version.
    pub position: usize,
}

impl Column {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            default: None,
            primary_key: false,
            autoincrement: false,
            unique: false,
            reference: None,
            position: 0,
        }
    }

    /// Reject nulls.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as an autoincrementing primary key.
    pub fn autoincrement(mut self) -> Self {
        self.primary_key = true;
        self.autoincrement = true;
        self
    }

    /// Add a UNIQUE constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultExpr) -> Self {
        self.default = Some(default);
        self
    }

    /// Add a foreign key clause.
    pub fn references(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        on_delete: DeleteBehavior,
    ) -> Self {
        self.reference = Some(References {
            table: table.into(),
            column: column.into(),
            on_delete,
        });
        self
    }

    /// Whether inserts may omit this column.
    pub fn accepts_missing_value(&self) -> bool {
        !self.not_null || self.default.is_some() || self.primary_key
    }

    /// Render the column definition clause.
    pub fn sql(&self) -> String {
        let mut clause = format!("{} {}", self.name, self.column_type);
        if self.primary_key {
            clause.push_str(" PRIMARY KEY");
        }
        if self.autoincrement {
            clause.push_str(" AUTOINCREMENT");
        }
        if self.unique {
            clause.push_str(" UNIQUE");
        }
        if self.not_null {
            clause.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            clause.push_str(" DEFAULT ");
            clause.push_str(&default.sql());
        }
        if let Some(reference) = &self.reference {
            clause.push(' ');
            clause.push_str(&reference.sql());
        }
        clause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = Column::new("batch_lot", ColumnType::Varchar(50))
            .unique()
            .not_null();

        assert!(col.not_null);
        assert!(col.unique);
        assert_eq!(col.sql(), "batch_lot VARCHAR(50) UNIQUE NOT NULL");
    }

    #[test]
    fn test_autoincrement_primary_key() {
        let col = Column::new("id", ColumnType::Integer).autoincrement();
        assert_eq!(col.sql(), "id INTEGER PRIMARY KEY AUTOINCREMENT");
    }

    #[test]
    fn test_references_set_null() {
        let col = Column::new("work_order_id", ColumnType::Integer).references(
            "blending_order",
            "id",
            DeleteBehavior::SetNull,
        );
        assert_eq!(
            col.sql(),
            "work_order_id INTEGER REFERENCES blending_order(id) ON DELETE SET NULL"
        );
    }

    #[test]
    fn test_default_rendering() {
        assert_eq!(DefaultExpr::Text("in_progress".into()).sql(), "'in_progress'");
        assert_eq!(DefaultExpr::Text("it's".into()).sql(), "'it''s'");
        assert_eq!(DefaultExpr::Int(0).sql(), "0");
        assert_eq!(
            DefaultExpr::Expression("DATE('now')".into()).sql(),
            "(DATE('now'))"
        );
    }

    #[test]
    fn test_constant_defaults() {
        assert!(DefaultExpr::Int(0).is_constant());
        assert!(!DefaultExpr::CurrentTimestamp.is_constant());
        assert!(!DefaultExpr::Expression("DATE('now')".into()).is_constant());
    }

    #[test]
    fn test_type_parsing_round_trip() {
        for ty in [
            ColumnType::Integer,
            ColumnType::Varchar(50),
            ColumnType::Decimal(10, 2),
            ColumnType::Boolean,
            ColumnType::Timestamp,
        ] {
            assert_eq!(ColumnType::parse(&ty.to_string()), ty);
        }
    }

    #[test]
    fn test_unknown_type_preserved() {
        assert_eq!(
            ColumnType::parse("BLOB"),
            ColumnType::Other("BLOB".to_string())
        );
    }
}
