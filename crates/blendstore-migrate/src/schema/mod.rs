//! Declarative schema model.
//!
//! Tables, columns, defaults, and index directives, described independently
//! of the store so migration targets can be validated and rendered to DDL.

mod column;
mod index;
mod table;

pub use column::{Column, ColumnType, DefaultExpr, DeleteBehavior, References};
pub use index::IndexDef;
pub use table::TableSchema;
