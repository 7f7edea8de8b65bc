//! Migration step model.
//!
//! A step is an idempotent unit of schema change: a precondition over the
//! live table shape, a schema action, index directives, and an optional
//! backfill. Preconditions are pure functions over a `TableSchema`, so they
//! are testable without a store.

use rusqlite::Connection;
use serde::Serialize;

use super::backfill::BackfillRule;
use super::rebuild::{ColumnCopy, RebuildRecipe};
use super::{ddl, introspect, rebuild};
use crate::error::Error;
use crate::schema::{Column, IndexDef, TableSchema};

/// What a precondition decided about the live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The change is still missing; the step must run.
    Apply,
    /// The state the step would create already exists.
    Skip,
}

/// Precondition predicate of a migration step.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The table does not exist yet.
    TableAbsent(String),
    /// The table exists but lacks the column.
    ColumnAbsent {
        /// Table to inspect.
        table: String,
        /// Column whose absence triggers the step.
        column: String,
    },
    /// The column still carries a NOT NULL constraint.
    ColumnNotNull {
        /// Table to inspect.
        table: String,
        /// Column whose constraint triggers the step.
        column: String,
    },
}

impl Precondition {
    /// Table the predicate inspects.
    pub fn table(&self) -> &str {
        match self {
            Precondition::TableAbsent(table) => table,
            Precondition::ColumnAbsent { table, .. } => table,
            Precondition::ColumnNotNull { table, .. } => table,
        }
    }

    /// Evaluate against a freshly introspected table shape.
    ///
    /// Column-level predicates require the table to exist; a missing table
    /// is a [`Error::TableNotFound`], not a skip.
    pub fn evaluate(&self, schema: Option<&TableSchema>) -> Result<Disposition, Error> {
        match self {
            Precondition::TableAbsent(_) => Ok(match schema {
                Some(_) => Disposition::Skip,
                None => Disposition::Apply,
            }),
            Precondition::ColumnAbsent { table, column } => {
                let schema = schema.ok_or_else(|| Error::TableNotFound {
                    table: table.clone(),
                })?;
                Ok(if schema.has_column(column) {
                    Disposition::Skip
                } else {
                    Disposition::Apply
                })
            }
            Precondition::ColumnNotNull { table, column } => {
                let schema = schema.ok_or_else(|| Error::TableNotFound {
                    table: table.clone(),
                })?;
                let col = schema.column(column).ok_or_else(|| Error::ColumnNotFound {
                    table: table.clone(),
                    column: column.clone(),
                })?;
                Ok(if col.not_null {
                    Disposition::Apply
                } else {
                    Disposition::Skip
                })
            }
        }
    }
}

/// Schema action of a migration step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Create a table declaratively.
    CreateTable(TableSchema),
    /// Add a column, falling back to a shadow rebuild when the store cannot
    /// add it directly.
    AddColumn {
        /// Table receiving the column.
        table: String,
        /// The column to add.
        column: Column,
    },
    /// Rebuild a table into a new shape.
    Rebuild(RebuildRecipe),
}

impl StepAction {
    /// Execute the action against an open transaction.
    pub fn apply(&self, conn: &Connection) -> Result<ActionReport, Error> {
        match self {
            StepAction::CreateTable(schema) => {
                if ddl::create_table_if_absent(conn, schema)? {
                    Ok(ActionReport::applied(format!(
                        "created table {}",
                        schema.name
                    )))
                } else {
                    Ok(ActionReport::noop(format!(
                        "table {} already present",
                        schema.name
                    )))
                }
            }
            StepAction::AddColumn { table, column } => {
                if let Some(reason) = ddl::add_column_unsupported(column) {
                    Self::add_column_via_rebuild(conn, table, column, reason)
                } else if ddl::add_column_if_absent(conn, table, column)? {
                    Ok(ActionReport::applied(format!(
                        "added column {}.{}",
                        table, column.name
                    )))
                } else {
                    Ok(ActionReport::noop(format!(
                        "column {}.{} already present",
                        table, column.name
                    )))
                }
            }
            StepAction::Rebuild(recipe) => {
                let outcome = rebuild::execute(conn, recipe)?;
                Ok(ActionReport::applied(format!(
                    "rebuilt table {} ({} rows carried)",
                    recipe.target.name, outcome.rows_copied
                )))
            }
        }
    }

    /// Route an unsupported direct addition through the shadow rebuilder.
    ///
    /// The target shape is the introspected source with the new column
    /// appended; existing rows carry over column by column and the new
    /// column fills from its default. A NOT NULL column without a default
    /// still fails recipe validation before any DDL runs.
    fn add_column_via_rebuild(
        conn: &Connection,
        table: &str,
        column: &Column,
        reason: &str,
    ) -> Result<ActionReport, Error> {
        let source = introspect::describe_table(conn, table)?.ok_or_else(|| {
            Error::TableNotFound {
                table: table.to_string(),
            }
        })?;
        if source.has_column(&column.name) {
            return Ok(ActionReport::noop(format!(
                "column {}.{} already present",
                table, column.name
            )));
        }

        let copies: Vec<ColumnCopy> = source
            .columns
            .iter()
            .map(|c| ColumnCopy::column(&c.name, &c.name))
            .collect();
        let mut target = TableSchema::new(table);
        for existing in &source.columns {
            target = target.with_column(existing.clone());
        }
        target = target.with_column(column.clone());

        let recipe = RebuildRecipe {
            source: table.to_string(),
            target,
            mapping: super::rebuild::ColumnMapping::Explicit(copies),
            indexes: Vec::new(),
        };
        let outcome = rebuild::execute(conn, &recipe)?;
        Ok(ActionReport::applied(format!(
            "added column {}.{} via shadow rebuild ({} rows carried): {}",
            table, column.name, outcome.rows_copied, reason
        )))
    }
}

/// One idempotent unit of schema change.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStep {
    /// Step identity, used in reports and errors.
    pub name: String,
    /// Predicate deciding whether the step still needs to run.
    pub precondition: Precondition,
    /// The schema action.
    pub action: StepAction,
    /// Indexes recreated after the action.
    pub indexes: Vec<IndexDef>,
    /// Optional backfill run after the indexes.
    pub backfill: Option<BackfillRule>,
}

impl MigrationStep {
    /// Create a step.
    pub fn new(name: impl Into<String>, precondition: Precondition, action: StepAction) -> Self {
        Self {
            name: name.into(),
            precondition,
            action,
            indexes: Vec::new(),
            backfill: None,
        }
    }

    /// Add an index directive.
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Attach a backfill rule.
    pub fn with_backfill(mut self, rule: BackfillRule) -> Self {
        self.backfill = Some(rule);
        self
    }
}

/// Terminal and transient states of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    /// Precondition not yet evaluated.
    Pending,
    /// Desired state already held; nothing ran.
    Skipped,
    /// Step action in progress.
    Applying,
    /// Step committed.
    Applied,
    /// Step rolled back after an error.
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Applying => write!(f, "applying"),
            StepStatus::Applied => write!(f, "applied"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one sub-action within a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    /// Whether the sub-action changed the store.
    pub applied: bool,
    /// Human-readable summary for the caller to render.
    pub detail: String,
}

impl ActionReport {
    fn applied(detail: String) -> Self {
        Self {
            applied: true,
            detail,
        }
    }

    fn noop(detail: String) -> Self {
        Self {
            applied: false,
            detail,
        }
    }

    /// Build a report for an index directive.
    pub(crate) fn for_index(index: &IndexDef, created: bool) -> Self {
        if created {
            Self::applied(format!("created index {}", index.name))
        } else {
            Self::noop(format!("index {} already present", index.name))
        }
    }

    /// Build a report for a backfill run.
    pub(crate) fn for_backfill(rule: &BackfillRule, rows: usize) -> Self {
        Self {
            applied: rows > 0,
            detail: format!(
                "backfilled {}.{} on {} rows",
                rule.table, rule.target_column, rows
            ),
        }
    }
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Step identity.
    pub step: String,
    /// Terminal status.
    pub status: StepStatus,
    /// Per-sub-action outcomes, in execution order.
    pub actions: Vec<ActionReport>,
}

/// Result of a whole migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct RunReport {
    /// Per-step outcomes, in declaration order.
    pub steps: Vec<StepReport>,
}

impl RunReport {
    /// Whether every step found its state already in place.
    pub fn all_skipped(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Skipped)
    }

    /// Number of steps that applied changes.
    pub fn applied_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Applied)
            .count()
    }
}
