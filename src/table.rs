//! Column-oriented in-memory tables of typed cells.
//!
//! Everything the pipeline handles - admissions, the cohort, the item dictionary, each chunk of
//! the event log - is a [`Table`]. Column order is significant and is kept by every operation.

mod value;
pub(crate) use value::Key;
pub use value::{ColumnType, Value, DATETIME_FORMAT};

use crate::{error::TableError, ArcStr};
use itertools::{EitherOrBoth, Itertools};
use std::collections::HashSet;

/// A named, typed sequence of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: ArcStr,
    ty: ColumnType,
    values: Vec<Value>,
}

impl Column {
    /// Build a column from raw cell text, inferring its type.
    ///
    /// Every cell renders back to its raw text, whatever type the column is widened to later.
    pub fn from_raw(name: impl Into<ArcStr>, raw: Vec<String>) -> Self {
        Column::from_values(name, raw.iter().map(|cell| Value::parse(cell)).collect())
    }

    /// Build a column from already typed values.
    pub fn from_values(name: impl Into<ArcStr>, values: Vec<Value>) -> Self {
        let mut column = Column {
            name: name.into(),
            ty: ColumnType::Null,
            values,
        };
        let ty = column
            .values
            .iter()
            .fold(ColumnType::Null, |ty, value| ty.unify(value.ty()));
        column.cast(column.widen_to(ty));
        column
    }

    pub fn empty(name: impl Into<ArcStr>) -> Self {
        Column {
            name: name.into(),
            ty: ColumnType::Null,
            values: vec![],
        }
    }

    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn renamed(mut self, name: impl Into<ArcStr>) -> Self {
        self.name = name.into();
        self
    }

    /// Gather the given rows, in the given order.
    pub(crate) fn take(&self, rows: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            ty: self.ty,
            values: rows.iter().map(|idx| self.values[*idx].clone()).collect(),
        }
    }

    /// Like `take`, but `None` produces a null cell.
    pub(crate) fn take_optional(&self, rows: &[Option<usize>]) -> Column {
        Column {
            name: self.name.clone(),
            ty: self.ty,
            values: rows
                .iter()
                .map(|idx| match idx {
                    Some(idx) => self.values[*idx].clone(),
                    None => Value::Null,
                })
                .collect(),
        }
    }

    /// `ty`, or text if widening to `ty` would change how some value is written.
    fn widen_to(&self, ty: ColumnType) -> ColumnType {
        let inexact = |value: &Value| matches!(value, Value::Int(v) if v.unsigned_abs() > 1 << 53);
        if ty == ColumnType::Float && self.values.iter().any(inexact) {
            ColumnType::Text
        } else {
            ty
        }
    }

    /// Widen every value to `ty`.
    fn cast(&mut self, ty: ColumnType) {
        if self.ty == ty {
            return;
        }
        for value in self.values.iter_mut() {
            *value = std::mem::replace(value, Value::Null).cast(ty);
        }
        self.ty = ty;
    }

    /// Append `other`, widening both sides to a common type first.
    fn append(&mut self, mut other: Column) {
        let ty = self.ty.unify(other.ty);
        let ty = self.widen_to(other.widen_to(ty));
        self.cast(ty);
        other.cast(ty);
        self.values.append(&mut other.values);
    }
}

/// A set of equal-length columns with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let len = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in columns.iter() {
            if !seen.insert(column.name.clone()) {
                return Err(TableError::SchemaMismatch {
                    column: column.name.clone(),
                    detail: "column name appears more than once".into(),
                });
            }
            if column.len() != len {
                return Err(TableError::SchemaMismatch {
                    column: column.name.clone(),
                    detail: format!("has {} rows, expected {}", column.len(), len),
                });
            }
        }
        Ok(Table { columns, len })
    }

    /// A table with the given columns and no rows.
    pub fn empty<S: Into<ArcStr>>(names: impl IntoIterator<Item = S>) -> Result<Self, TableError> {
        Self::new(names.into_iter().map(Column::empty).collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<ArcStr> {
        self.columns.iter().map(|col| col.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| &*col.name == name)
    }

    /// Get a column that must exist.
    pub fn require(&self, name: &str) -> Result<&Column, TableError> {
        self.column(name)
            .ok_or_else(|| TableError::missing_column(name, &self.column_names()))
    }

    fn position(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|col| &*col.name == name)
            .ok_or_else(|| TableError::missing_column(name, &self.column_names()))
    }

    /// The cells of row `idx`, in column order.
    pub fn row(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.columns.iter().map(move |col| &col.values[idx])
    }

    /// Lower-case every column name.
    ///
    /// Fails if two names only differ by case.
    pub fn lowercase_column_names(&mut self) -> Result<(), TableError> {
        let mut seen = HashSet::new();
        for column in self.columns.iter_mut() {
            let lower = column.name.to_lowercase();
            if !seen.insert(lower.clone()) {
                return Err(TableError::SchemaMismatch {
                    column: column.name.clone(),
                    detail: "clashes with another column once lower-cased".into(),
                });
            }
            if *column.name != *lower {
                column.name = lower.into();
            }
        }
        Ok(())
    }

    /// Lower-case the text cells of a column.
    pub fn lowercase_values(&mut self, name: &str) -> Result<(), TableError> {
        let idx = self.position(name)?;
        for value in self.columns[idx].values.iter_mut() {
            if let Value::Text(text) = value {
                if text.chars().any(char::is_uppercase) {
                    *text = text.to_lowercase().into();
                }
            }
        }
        Ok(())
    }

    /// Treat every cell of a column as text.
    pub fn cast_to_text(&mut self, name: &str) -> Result<(), TableError> {
        let idx = self.position(name)?;
        self.columns[idx].cast(ColumnType::Text);
        Ok(())
    }

    /// A new table with only the named columns, in the order given.
    pub fn select(&self, names: &[&str]) -> Result<Table, TableError> {
        let columns = names
            .iter()
            .map(|name| self.require(name).map(Clone::clone))
            .collect::<Result<Vec<_>, _>>()?;
        Table::new(columns)
    }

    /// Gather the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|col| col.take(rows)).collect(),
            len: rows.len(),
        }
    }

    /// Stack tables with the same column names on top of each other.
    ///
    /// Column types are widened where the parts disagree, so the result does not depend on how
    /// the rows were split up.
    pub fn concat(parts: Vec<Table>) -> Result<Table, TableError> {
        let mut parts = parts.into_iter();
        let mut out = match parts.next() {
            Some(first) => first,
            None => return Ok(Table::default()),
        };
        for part in parts {
            let mismatch = out
                .columns
                .iter()
                .zip_longest(part.columns.iter())
                .find_map(|pair| match pair {
                    EitherOrBoth::Both(ours, theirs) if ours.name == theirs.name => None,
                    EitherOrBoth::Both(_, col)
                    | EitherOrBoth::Left(col)
                    | EitherOrBoth::Right(col) => Some(col.name.clone()),
                });
            if let Some(column) = mismatch {
                return Err(TableError::SchemaMismatch {
                    column,
                    detail: "tables being stacked have different columns".into(),
                });
            }
            out.len += part.len;
            for (ours, theirs) in out.columns.iter_mut().zip(part.columns) {
                ours.append(theirs);
            }
        }
        Ok(out)
    }
}
