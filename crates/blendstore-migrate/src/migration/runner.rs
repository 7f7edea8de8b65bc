//! Migration runner.
//!
//! Executes steps strictly in declaration order, one transaction per step.
//! A later step may assume every earlier step is either skipped or applied:
//! the run halts on the first failure instead of continuing past a broken
//! precondition.

use tracing::{info, warn};

use super::step::{
    ActionReport, Disposition, MigrationStep, RunReport, StepReport, StepStatus,
};
use super::{backfill, ddl, introspect};
use crate::error::{Error, StepPhase};
use crate::store::Store;

/// Orchestrates an ordered sequence of migration steps.
#[derive(Debug, Default)]
pub struct MigrationRunner {
    steps: Vec<MigrationStep>,
}

impl MigrationRunner {
    /// Create an empty runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner over an ordered step list.
    pub fn with_steps(steps: Vec<MigrationStep>) -> Self {
        Self { steps }
    }

    /// Append a step.
    pub fn push(&mut self, step: MigrationStep) {
        self.steps.push(step);
    }

    /// Run every step in order.
    ///
    /// Each step runs inside its own transaction; an error rolls that
    /// transaction back and surfaces as [`Error::StepFailed`] carrying the
    /// step identity and phase. Steps before the failure point stay
    /// committed; steps after it never start.
    pub fn run(&self, store: &mut Store) -> Result<RunReport, Error> {
        let mut report = RunReport::default();
        for step in &self.steps {
            match Self::run_step(store, step) {
                Ok(step_report) => {
                    info!(step = %step.name, status = %step_report.status, "step finished");
                    report.steps.push(step_report);
                }
                Err(err) => {
                    warn!(
                        step = %step.name,
                        status = %StepStatus::Failed,
                        error = %err,
                        "step failed; run halted"
                    );
                    return Err(err);
                }
            }
        }
        Ok(report)
    }

    fn run_step(store: &mut Store, step: &MigrationStep) -> Result<StepReport, Error> {
        let tx = store.transaction()?;

        let schema = introspect::describe_table(&tx, step.precondition.table())
            .map_err(|e| e.in_step(&step.name, StepPhase::Precondition))?;
        let disposition = step
            .precondition
            .evaluate(schema.as_ref())
            .map_err(|e| e.in_step(&step.name, StepPhase::Precondition))?;

        if disposition == Disposition::Skip {
            // nothing ran; the transaction guard drops without committing
            return Ok(StepReport {
                step: step.name.clone(),
                status: StepStatus::Skipped,
                actions: Vec::new(),
            });
        }

        info!(step = %step.name, status = %StepStatus::Applying, "applying step");
        let mut actions = Vec::new();

        actions.push(
            step.action
                .apply(&tx)
                .map_err(|e| e.in_step(&step.name, StepPhase::Action))?,
        );

        for index in &step.indexes {
            let created = ddl::create_index_if_absent(&tx, index)
                .map_err(|e| e.in_step(&step.name, StepPhase::Index))?;
            actions.push(ActionReport::for_index(index, created));
        }

        if let Some(rule) = &step.backfill {
            let rows = backfill::apply_backfill(&tx, rule)
                .map_err(|e| e.in_step(&step.name, StepPhase::Backfill))?;
            actions.push(ActionReport::for_backfill(rule, rows));
        }

        tx.commit()
            .map_err(|e| Error::from(e).in_step(&step.name, StepPhase::Commit))?;

        Ok(StepReport {
            step: step.name.clone(),
            status: StepStatus::Applied,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::step::{Precondition, StepAction};
    use crate::schema::{Column, ColumnType, IndexDef, TableSchema};

    fn create_orders_step() -> MigrationStep {
        let schema = TableSchema::new("orders")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement())
            .with_column(Column::new("number", ColumnType::Varchar(50)).unique().not_null());
        MigrationStep::new(
            "create orders",
            Precondition::TableAbsent("orders".into()),
            StepAction::CreateTable(schema),
        )
        .with_index(IndexDef::new("idx_orders_number", "orders", &["number"]))
    }

    #[test]
    fn test_second_run_skips_everything() {
        let mut store = Store::open_in_memory().unwrap();
        let runner = MigrationRunner::with_steps(vec![create_orders_step()]);

        let first = runner.run(&mut store).unwrap();
        assert_eq!(first.applied_count(), 1);
        assert!(first.steps[0].actions.iter().all(|a| a.applied));

        let second = runner.run(&mut store).unwrap();
        assert!(second.all_skipped());
        assert!(second.steps[0].actions.is_empty());
    }

    #[test]
    fn test_failure_halts_run() {
        let mut store = Store::open_in_memory().unwrap();
        let broken = MigrationStep::new(
            "add column to missing table",
            Precondition::TableAbsent("nowhere_else".into()),
            StepAction::AddColumn {
                table: "nowhere".into(),
                column: Column::new("c", ColumnType::Integer),
            },
        );
        let runner = MigrationRunner::with_steps(vec![
            create_orders_step(),
            broken,
            create_orders_step(),
        ]);

        let err = runner.run(&mut store).unwrap_err();
        match err {
            Error::StepFailed { step, phase, .. } => {
                assert_eq!(step, "add column to missing table");
                assert_eq!(phase, StepPhase::Action);
            }
            other => panic!("expected StepFailed, got {other:?}"),
        }
        // the first step committed before the failure
        assert!(introspect::table_exists(store.conn(), "orders").unwrap());
    }

    #[test]
    fn test_failed_step_rolls_back_partial_work() {
        let mut store = Store::open_in_memory().unwrap();
        let schema = TableSchema::new("widgets")
            .with_column(Column::new("id", ColumnType::Integer).autoincrement());
        let step = MigrationStep::new(
            "create widgets with bad backfill",
            Precondition::TableAbsent("widgets".into()),
            StepAction::CreateTable(schema),
        )
        .with_backfill(crate::migration::BackfillRule::new(
            "widgets", "kind", "weight", "flag", "1",
        ));
        let runner = MigrationRunner::with_steps(vec![step]);

        let err = runner.run(&mut store).unwrap_err();
        assert!(matches!(err, Error::StepFailed { phase: StepPhase::Backfill, .. }));
        // the create inside the failed step was rolled back with it
        assert!(!introspect::table_exists(store.conn(), "widgets").unwrap());
    }
}
