//! Backfill of derived column values.
//!
//! A backfill is an additive correction pass over existing rows: group rows
//! by a key, select one row per group by a maximum rule, and write a value
//! into the selected rows only. Re-running with unchanged source data
//! produces the same selection and the same writes.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::debug;

use super::introspect;
use crate::error::Error;

/// A declarative grouping/aggregation backfill rule.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillRule {
    /// Table holding the rows.
    pub table: String,
    /// Row identity column, used for updates and for tie-breaking.
    pub id_column: String,
    /// Grouping key column; key equality determines group membership.
    pub group_by: String,
    /// Numeric column ranked within each group; the greatest value wins.
    pub rank_by: String,
    /// Optional SQL predicate restricting the candidate rows.
    pub filter: Option<String>,
    /// Column written on the selected rows.
    pub target_column: String,
    /// SQL expression written into the target column.
    pub target_value: String,
}

impl BackfillRule {
    /// Create a rule selecting, per `group_by` group, the row with the
    /// greatest `rank_by` value, and writing `target_value` into
    /// `target_column` for it. Row identity defaults to the `id` column.
    pub fn new(
        table: impl Into<String>,
        group_by: impl Into<String>,
        rank_by: impl Into<String>,
        target_column: impl Into<String>,
        target_value: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            id_column: "id".to_string(),
            group_by: group_by.into(),
            rank_by: rank_by.into(),
            filter: None,
            target_column: target_column.into(),
            target_value: target_value.into(),
        }
    }

    /// Restrict candidate rows with an SQL predicate.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Use a different row identity column.
    pub fn with_id_column(mut self, id_column: impl Into<String>) -> Self {
        self.id_column = id_column.into();
        self
    }
}

/// Grouping key over store values.
///
/// Hashable so group membership is decided by value equality, never by row
/// ordering; reals are keyed by their bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Null,
    Int(i64),
    Real(u64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<Value> for GroupKey {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => GroupKey::Null,
            Value::Integer(v) => GroupKey::Int(v),
            Value::Real(v) => GroupKey::Real(v.to_bits()),
            Value::Text(v) => GroupKey::Text(v),
            Value::Blob(v) => GroupKey::Blob(v),
        }
    }
}

/// Apply a backfill rule; returns the number of rows written.
///
/// Rows are scanned in ascending id order and the selection is replaced only
/// on a strictly greater rank, so ties resolve to the lowest row id. Rows
/// whose rank is null never win a group. Rows not selected keep whatever
/// value the target column already holds.
pub fn apply_backfill(conn: &Connection, rule: &BackfillRule) -> Result<usize, Error> {
    let schema = introspect::describe_table(conn, &rule.table)?.ok_or_else(|| {
        Error::TableNotFound {
            table: rule.table.clone(),
        }
    })?;
    for column in [
        &rule.id_column,
        &rule.group_by,
        &rule.rank_by,
        &rule.target_column,
    ] {
        if !schema.has_column(column) {
            return Err(Error::ColumnNotFound {
                table: rule.table.clone(),
                column: column.clone(),
            });
        }
    }

    let filter = rule
        .filter
        .as_deref()
        .map(|f| format!(" WHERE {f}"))
        .unwrap_or_default();
    let scan = format!(
        "SELECT {id}, {group}, {rank} FROM {table}{filter} ORDER BY {id}",
        id = rule.id_column,
        group = rule.group_by,
        rank = rule.rank_by,
        table = rule.table,
    );

    let mut selected: HashMap<GroupKey, (i64, f64)> = HashMap::new();
    let mut stmt = conn.prepare(&scan)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Value>(1)?,
            row.get::<_, Option<f64>>(2)?,
        ))
    })?;

    for row in rows {
        let (id, key, rank) = row?;
        let Some(rank) = rank else { continue };
        match selected.entry(GroupKey::from(key)) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert((id, rank));
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if rank > slot.get().1 {
                    slot.insert((id, rank));
                }
            }
        }
    }

    let mut winners: Vec<i64> = selected.values().map(|(id, _)| *id).collect();
    winners.sort_unstable();

    let update = format!(
        "UPDATE {table} SET {target} = {value} WHERE {id} = ?1",
        table = rule.table,
        target = rule.target_column,
        value = rule.target_value,
        id = rule.id_column,
    );
    let mut stmt = conn.prepare(&update)?;
    let mut updated = 0;
    for id in winners {
        updated += stmt.execute([id])?;
    }

    debug!(
        table = %rule.table,
        column = %rule.target_column,
        rows = updated,
        "backfill applied"
    );
    Ok(updated)
}
