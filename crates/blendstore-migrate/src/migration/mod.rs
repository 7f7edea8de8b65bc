//! Migration engine.
//!
//! This module provides safe schema evolution for stores whose DDL surface
//! is limited to create table, create index, add column, drop table, and
//! rename table:
//! - Fresh introspection of live table shapes before every step
//! - Idempotent steps gated by pure preconditions
//! - Shadow-table rebuilds for alterations the store cannot express
//! - Grouped-aggregation backfill of derived column values
//! - One all-or-nothing transaction per step
//!
//! # Example
//!
//! ```ignore
//! use blendstore_migrate::migration::{MigrationRunner, MigrationStep, Precondition, StepAction};
//!
//! let runner = MigrationRunner::with_steps(vec![MigrationStep::new(
//!     "create work-order ledger",
//!     Precondition::TableAbsent("blending_order".into()),
//!     StepAction::CreateTable(schema),
//! )]);
//!
//! let report = runner.run(&mut store)?;
//! for step in &report.steps {
//!     println!("{}: {}", step.step, step.status);
//! }
//! ```

pub mod backfill;
pub mod ddl;
pub mod introspect;
pub mod rebuild;
pub mod runner;
pub mod step;

// Backfill types
pub use backfill::{apply_backfill, BackfillRule};

// Rebuild types
pub use rebuild::{ColumnCopy, ColumnMapping, CopySource, RebuildOutcome, RebuildRecipe};

// Runner types
pub use runner::MigrationRunner;

// Step types
pub use step::{
    ActionReport, Disposition, MigrationStep, Precondition, RunReport, StepAction, StepReport,
    StepStatus,
};
