//! Migration catalog for the blending store.
//!
//! The ordered schema history of the powder blending database: work-order
//! ledger, blend batches, recipes, and the evolution steps that linked them
//! together. `migrate` brings any historical version of the store — including
//! an empty file — to the current shape.

use crate::error::Error;
use crate::migration::{
    BackfillRule, ColumnMapping, MigrationRunner, MigrationStep, Precondition, RebuildRecipe,
    RunReport, StepAction,
};
use crate::schema::{Column, ColumnType, DefaultExpr, DeleteBehavior, IndexDef, TableSchema};
use crate::store::Store;

/// Apply the full catalog to a store.
pub fn migrate(store: &mut Store) -> Result<RunReport, Error> {
    MigrationRunner::with_steps(migrations()).run(store)
}

/// The ordered migration steps of the blending store.
pub fn migrations() -> Vec<MigrationStep> {
    vec![
        create_work_order_ledger(),
        create_blend_batch_table(),
        create_recipe_table(),
        link_batches_to_work_orders(),
        make_legacy_work_order_optional(),
        flag_primary_ingredients(),
        record_primary_powder_weights(),
    ]
}

fn blending_order_schema() -> TableSchema {
    TableSchema::new("blending_order")
        .with_column(Column::new("id", ColumnType::Integer).autoincrement())
        .with_column(
            Column::new("work_order_number", ColumnType::Varchar(50))
                .unique()
                .not_null(),
        )
        .with_column(Column::new("product_name", ColumnType::Varchar(100)).not_null())
        .with_column(Column::new("product_code", ColumnType::Varchar(50)))
        .with_column(Column::new("total_target_weight", ColumnType::Decimal(10, 2)).not_null())
        .with_column(
            Column::new("status", ColumnType::Varchar(20))
                .with_default(DefaultExpr::Text("in_progress".into())),
        )
        .with_column(Column::new("created_by", ColumnType::Varchar(50)))
        .with_column(
            Column::new("created_date", ColumnType::Date)
                .with_default(DefaultExpr::Expression("DATE('now')".into())),
        )
        .with_column(Column::new("notes", ColumnType::Text))
        .with_column(
            Column::new("created_at", ColumnType::Timestamp)
                .with_default(DefaultExpr::CurrentTimestamp),
        )
        .with_column(
            Column::new("updated_at", ColumnType::Timestamp)
                .with_default(DefaultExpr::CurrentTimestamp),
        )
}

/// The blend batch table as it shipped before work-order linkage: the
/// free-text `work_order` field was still required and nothing referenced
/// the ledger. Fresh stores start here and move through the same evolution
/// steps long-lived stores did.
fn legacy_blend_batch_schema() -> TableSchema {
    TableSchema::new("blending_work")
        .with_column(Column::new("id", ColumnType::Integer).autoincrement())
        .with_column(Column::new("work_order", ColumnType::Varchar(50)).not_null())
        .with_column(Column::new("product_name", ColumnType::Varchar(100)).not_null())
        .with_column(Column::new("product_code", ColumnType::Varchar(50)))
        .with_column(
            Column::new("batch_lot", ColumnType::Varchar(50))
                .unique()
                .not_null(),
        )
        .with_column(Column::new("target_total_weight", ColumnType::Decimal(10, 2)))
        .with_column(Column::new("actual_total_weight", ColumnType::Decimal(10, 2)))
        .with_column(Column::new("blending_time", ColumnType::Integer))
        .with_column(Column::new("blending_temperature", ColumnType::Decimal(5, 2)))
        .with_column(Column::new("blending_rpm", ColumnType::Integer))
        .with_column(Column::new("operator", ColumnType::Varchar(50)))
        .with_column(
            Column::new("status", ColumnType::Varchar(20))
                .with_default(DefaultExpr::Text("in_progress".into())),
        )
        .with_column(
            Column::new("start_time", ColumnType::Timestamp)
                .with_default(DefaultExpr::CurrentTimestamp),
        )
        .with_column(Column::new("end_time", ColumnType::Timestamp))
        .with_column(Column::new("notes", ColumnType::Text))
        .with_column(
            Column::new("created_at", ColumnType::Timestamp)
                .with_default(DefaultExpr::CurrentTimestamp),
        )
        .with_column(
            Column::new("updated_at", ColumnType::Timestamp)
                .with_default(DefaultExpr::CurrentTimestamp),
        )
}

/// The current blend batch shape: `work_order_id` sits second in the layout
/// and the legacy `work_order` text is optional.
fn current_blend_batch_schema() -> TableSchema {
    let mut target = TableSchema::new("blending_work")
        .with_column(Column::new("id", ColumnType::Integer).autoincrement())
        .with_column(Column::new("work_order_id", ColumnType::Integer).references(
            "blending_order",
            "id",
            DeleteBehavior::SetNull,
        ))
        .with_column(Column::new("work_order", ColumnType::Varchar(50)));
    for column in legacy_blend_batch_schema().columns.into_iter().skip(2) {
        target = target.with_column(column);
    }
    target
}

fn recipe_schema() -> TableSchema {
    TableSchema::new("recipe")
        .with_column(Column::new("id", ColumnType::Integer).autoincrement())
        .with_column(Column::new("product_name", ColumnType::Varchar(100)).not_null())
        .with_column(Column::new("powder_name", ColumnType::Varchar(100)).not_null())
        .with_column(Column::new("ratio", ColumnType::Decimal(5, 2)).not_null())
        .with_column(
            Column::new("is_active", ColumnType::Boolean).with_default(DefaultExpr::Int(1)),
        )
        .with_column(
            Column::new("created_at", ColumnType::Timestamp)
                .with_default(DefaultExpr::CurrentTimestamp),
        )
}

fn blend_batch_indexes() -> Vec<IndexDef> {
    vec![
        IndexDef::new("idx_blending_batch_lot", "blending_work", &["batch_lot"]),
        IndexDef::new("idx_blending_work_order", "blending_work", &["work_order"]),
        IndexDef::new("idx_blending_status", "blending_work", &["status"]),
    ]
}

fn work_order_reference_index() -> IndexDef {
    IndexDef::new("idx_blending_work_order_id", "blending_work", &["work_order_id"])
}

fn create_work_order_ledger() -> MigrationStep {
    MigrationStep::new(
        "create work-order ledger",
        Precondition::TableAbsent("blending_order".into()),
        StepAction::CreateTable(blending_order_schema()),
    )
    .with_index(IndexDef::new(
        "idx_blending_order_number",
        "blending_order",
        &["work_order_number"],
    ))
    .with_index(IndexDef::new(
        "idx_blending_order_status",
        "blending_order",
        &["status"],
    ))
    .with_index(IndexDef::new(
        "idx_blending_order_date",
        "blending_order",
        &["created_date"],
    ))
}

fn create_blend_batch_table() -> MigrationStep {
    let mut step = MigrationStep::new(
        "create blend batch table",
        Precondition::TableAbsent("blending_work".into()),
        StepAction::CreateTable(legacy_blend_batch_schema()),
    );
    for index in blend_batch_indexes() {
        step = step.with_index(index);
    }
    step
}

fn create_recipe_table() -> MigrationStep {
    MigrationStep::new(
        "create recipe table",
        Precondition::TableAbsent("recipe".into()),
        StepAction::CreateTable(recipe_schema()),
    )
    .with_index(IndexDef::new("idx_recipe_product", "recipe", &["product_name"]))
}

fn link_batches_to_work_orders() -> MigrationStep {
    MigrationStep::new(
        "link blend batches to work orders",
        Precondition::ColumnAbsent {
            table: "blending_work".into(),
            column: "work_order_id".into(),
        },
        StepAction::AddColumn {
            table: "blending_work".into(),
            column: Column::new("work_order_id", ColumnType::Integer).references(
                "blending_order",
                "id",
                DeleteBehavior::SetNull,
            ),
        },
    )
    .with_index(work_order_reference_index())
}

fn make_legacy_work_order_optional() -> MigrationStep {
    let recipe = RebuildRecipe {
        source: "blending_work".into(),
        target: current_blend_batch_schema(),
        mapping: ColumnMapping::Straight,
        indexes: blend_batch_indexes()
            .into_iter()
            .chain(std::iter::once(work_order_reference_index()))
            .collect(),
    };
    MigrationStep::new(
        "make legacy work order optional",
        Precondition::ColumnNotNull {
            table: "blending_work".into(),
            column: "work_order".into(),
        },
        StepAction::Rebuild(recipe),
    )
}

fn flag_primary_ingredients() -> MigrationStep {
    MigrationStep::new(
        "flag primary recipe ingredients",
        Precondition::ColumnAbsent {
            table: "recipe".into(),
            column: "is_main".into(),
        },
        StepAction::AddColumn {
            table: "recipe".into(),
            column: Column::new("is_main", ColumnType::Boolean).with_default(DefaultExpr::Int(0)),
        },
    )
    .with_backfill(
        BackfillRule::new("recipe", "product_name", "ratio", "is_main", "1")
            .with_filter("is_active = 1"),
    )
}

fn record_primary_powder_weights() -> MigrationStep {
    MigrationStep::new(
        "record primary powder weights per batch",
        Precondition::ColumnAbsent {
            table: "blending_work".into(),
            column: "main_powder_weights".into(),
        },
        StepAction::AddColumn {
            table: "blending_work".into(),
            column: Column::new("main_powder_weights", ColumnType::Text),
        },
    )
}
