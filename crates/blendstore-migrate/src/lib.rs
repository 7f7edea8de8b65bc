//! Blendstore migration engine - schema evolution for the blending database.
//!
//! The store's engine supports only a narrow set of direct DDL operations
//! (create table, create index, add column, drop table, rename table), so
//! changes like relaxing a NOT NULL constraint go through a shadow-table
//! rebuild that preserves every row. All steps are idempotent: running the
//! catalog against an already-current store skips everything.

pub mod blending;
pub mod error;
pub mod migration;
pub mod schema;
pub mod store;

pub use error::{Error, StepPhase};
pub use migration::{
    apply_backfill, BackfillRule, ColumnCopy, ColumnMapping, CopySource, MigrationRunner,
    MigrationStep, Precondition, RebuildRecipe, RunReport, StepAction, StepReport, StepStatus,
};
pub use schema::{Column, ColumnType, DefaultExpr, DeleteBehavior, IndexDef, References, TableSchema};
pub use store::Store;
