//! Equality joins on declared key columns.
//!
//! The output layout follows the usual dataframe `merge`: every left column in order (key columns
//! keep the left values), then the right non-key columns in order. A non-key name present on both
//! sides gets the suffix `_x` on the left and `_y` on the right. Each left row produces one
//! output row per matching right row, in right-table order.
use crate::{
    error::TableError,
    table::{Column, Key, Table},
    ArcStr,
};
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep only left rows with at least one match.
    Inner,
    /// Keep every left row; unmatched rows get null right-hand cells.
    Left,
}

/// Map from key to the rows holding it, built over the right-hand side of a join.
#[derive(Debug, Clone)]
struct KeyIndex {
    keys: Vec<ArcStr>,
    rows: HashMap<Vec<Key>, Vec<usize>>,
}

impl KeyIndex {
    fn build(table: &Table, keys: &[&str]) -> Result<Self, TableError> {
        let key_columns = keys
            .iter()
            .map(|key| table.require(key))
            .collect::<Result<Vec<_>, _>>()?;
        let mut rows: HashMap<Vec<Key>, Vec<usize>> = HashMap::new();
        for row in 0..table.len() {
            if let Some(key) = row_key(&key_columns, row) {
                rows.entry(key).or_default().push(row);
            }
        }
        Ok(KeyIndex {
            keys: keys.iter().map(|key| ArcStr::from(*key)).collect(),
            rows,
        })
    }
}

/// A table with a prebuilt index on its key columns.
///
/// Used for the small reference tables, which are joined against every chunk of the event log
/// and so should only be indexed once.
#[derive(Debug, Clone)]
pub struct IndexedTable {
    table: Table,
    index: KeyIndex,
}

impl IndexedTable {
    pub fn new(table: Table, keys: &[&str]) -> Result<Self, TableError> {
        let index = KeyIndex::build(&table, keys)?;
        Ok(IndexedTable { table, index })
    }

    /// Join `left` to this table.
    pub fn join(&self, left: &Table, kind: JoinKind) -> Result<Table, TableError> {
        join_indexed(left, &self.table, &self.index, kind)
    }
}

/// Join `left` to `right` where all the `keys` columns are equal.
pub fn join(
    left: &Table,
    right: &Table,
    keys: &[&str],
    kind: JoinKind,
) -> Result<Table, TableError> {
    let index = KeyIndex::build(right, keys)?;
    join_indexed(left, right, &index, kind)
}

/// Check that each key column exists on both sides with comparable types.
pub fn check_keys(left: &Table, right: &Table, keys: &[&str]) -> Result<(), TableError> {
    for key in keys {
        let ours = left.require(key)?;
        let theirs = right.require(key)?;
        if !ours.ty().is_join_compatible(theirs.ty()) {
            return Err(TableError::JoinKeyTypeMismatch {
                column: ours.name().clone(),
                left: ours.ty(),
                right: theirs.ty(),
            });
        }
    }
    Ok(())
}

fn join_indexed(
    left: &Table,
    right: &Table,
    index: &KeyIndex,
    kind: JoinKind,
) -> Result<Table, TableError> {
    let keys = index.keys.iter().map(|key| &**key).collect::<Vec<_>>();
    check_keys(left, right, &keys)?;
    let left_keys = keys
        .iter()
        .map(|key| left.require(key))
        .collect::<Result<Vec<_>, _>>()?;

    let mut left_rows = Vec::with_capacity(left.len());
    let mut right_rows = Vec::with_capacity(left.len());
    for row in 0..left.len() {
        match row_key(&left_keys, row).and_then(|key| index.rows.get(&key)) {
            Some(matches) => {
                for other in matches {
                    left_rows.push(row);
                    right_rows.push(Some(*other));
                }
            }
            None if kind == JoinKind::Left => {
                left_rows.push(row);
                right_rows.push(None);
            }
            None => (),
        }
    }

    let right_extra = right
        .columns()
        .iter()
        .filter(|col| !keys.contains(&&**col.name()))
        .collect::<Vec<_>>();
    let mut columns = Vec::with_capacity(left.width() + right_extra.len());
    for col in left.columns() {
        let taken = col.take(&left_rows);
        if right_extra.iter().any(|other| other.name() == col.name()) {
            columns.push(taken.renamed(format!("{}_x", col.name())));
        } else {
            columns.push(taken);
        }
    }
    for col in right_extra {
        let taken = col.take_optional(&right_rows);
        if left.column(col.name()).is_some() {
            columns.push(taken.renamed(format!("{}_y", col.name())));
        } else {
            columns.push(taken);
        }
    }
    Table::new(columns)
}

/// The key of a row, or `None` if any part of it is null.
fn row_key(columns: &[&Column], row: usize) -> Option<Vec<Key>> {
    columns.iter().map(|col| col.values()[row].key()).collect()
}
