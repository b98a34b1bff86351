//! In-memory columnar tables.
//!
//! Shards, tile tables and merged catalogs all travel as a [`Table`]: an
//! ordered list of named [`Column`]s of equal length. Reading and writing go
//! through the [`TableStore`] trait in [`io`].

pub mod io;

pub use io::{ColumnarFile, TableStore};

use crate::error::{Result, SurveyError};
use std::cmp::Ordering;

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Bool,
    Str,
}

impl ColumnKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ColumnKind::Int => 0,
            ColumnKind::Float => 1,
            ColumnKind::Bool => 2,
            ColumnKind::Str => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ColumnKind::Int),
            1 => Some(ColumnKind::Float),
            2 => Some(ColumnKind::Bool),
            3 => Some(ColumnKind::Str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl Column {
    pub fn with_capacity(kind: ColumnKind, capacity: usize) -> Self {
        match kind {
            ColumnKind::Int => Column::Int(Vec::with_capacity(capacity)),
            ColumnKind::Float => Column::Float(Vec::with_capacity(capacity)),
            ColumnKind::Bool => Column::Bool(Vec::with_capacity(capacity)),
            ColumnKind::Str => Column::Str(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Int(_) => ColumnKind::Int,
            Column::Float(_) => ColumnKind::Float,
            Column::Bool(_) => ColumnKind::Bool,
            Column::Str(_) => ColumnKind::Str,
        }
    }

    /// Rows at `indices`, in that order. Indices must be in range.
    pub fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(indices.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(indices.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(indices.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Append `other`, which must have the same kind.
    fn extend_from(&mut self, other: &Column) -> bool {
        match (self, other) {
            (Column::Int(a), Column::Int(b)) => a.extend_from_slice(b),
            (Column::Float(a), Column::Float(b)) => a.extend_from_slice(b),
            (Column::Bool(a), Column::Bool(b)) => a.extend_from_slice(b),
            (Column::Str(a), Column::Str(b)) => a.extend(b.iter().cloned()),
            _ => return false,
        }
        true
    }

    fn compare(&self, a: usize, b: usize) -> Ordering {
        match self {
            Column::Int(v) => v[a].cmp(&v[b]),
            Column::Float(v) => nan_last(v[a], v[b]),
            Column::Bool(v) => v[a].cmp(&v[b]),
            Column::Str(v) => v[a].cmp(&v[b]),
        }
    }
}

/// Total order on floats with NaN after every number.
fn nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Direction for [`Table::argsort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    /// Largest first; NaN still sorts last.
    Descending,
}

/// An ordered set of named, equal-length columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`push_column`](Self::push_column).
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.push_column(name, column)?;
        Ok(self)
    }

    /// Add a column, replacing any existing column of the same name in place.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        let replacing = self.position(&name);
        let others = self.columns.len() - usize::from(replacing.is_some());
        if others > 0 && column.len() != self.rows {
            return Err(SurveyError::integrity(format!(
                "column '{name}' has {} rows, table has {}",
                column.len(),
                self.rows
            )));
        }
        self.rows = column.len();
        match replacing {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.position(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| SurveyError::integrity(format!("missing column '{name}'")))
    }

    fn mistyped(name: &str, expected: ColumnKind, found: ColumnKind) -> SurveyError {
        SurveyError::integrity(format!(
            "column '{name}' is {found:?}, expected {expected:?}"
        ))
    }

    pub fn ints(&self, name: &str) -> Result<&[i64]> {
        match self.column(name)? {
            Column::Int(v) => Ok(v),
            other => Err(Self::mistyped(name, ColumnKind::Int, other.kind())),
        }
    }

    pub fn floats(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Float(v) => Ok(v),
            other => Err(Self::mistyped(name, ColumnKind::Float, other.kind())),
        }
    }

    pub fn bools(&self, name: &str) -> Result<&[bool]> {
        match self.column(name)? {
            Column::Bool(v) => Ok(v),
            other => Err(Self::mistyped(name, ColumnKind::Bool, other.kind())),
        }
    }

    pub fn strs(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            Column::Str(v) => Ok(v),
            other => Err(Self::mistyped(name, ColumnKind::Str, other.kind())),
        }
    }

    /// Integer or float column widened to `f64`.
    pub fn numeric_as_f64(&self, name: &str) -> Result<Vec<f64>> {
        match self.column(name)? {
            Column::Int(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            Column::Float(v) => Ok(v.clone()),
            other => Err(Self::mistyped(name, ColumnKind::Float, other.kind())),
        }
    }

    /// Non-negative integer column as pixel ids.
    pub fn pixel_ids(&self, name: &str) -> Result<Vec<u64>> {
        self.ints(name)?
            .iter()
            .map(|&v| {
                u64::try_from(v).map_err(|_| {
                    SurveyError::integrity(format!("negative pixel id {v} in column '{name}'"))
                })
            })
            .collect()
    }

    /// Rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Result<Table> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.rows) {
            return Err(SurveyError::integrity(format!(
                "row {bad} out of range for table of {} rows",
                self.rows
            )));
        }
        Ok(Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            rows: indices.len(),
        })
    }

    /// Rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Result<Table> {
        if mask.len() != self.rows {
            return Err(SurveyError::integrity(format!(
                "mask has {} entries, table has {} rows",
                mask.len(),
                self.rows
            )));
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        self.take(&indices)
    }

    /// Stable sort permutation on one column. Float NaNs sort last in both
    /// directions.
    pub fn argsort(&self, name: &str, order: SortOrder) -> Result<Vec<usize>> {
        let column = self.column(name)?;
        let mut indices: Vec<usize> = (0..self.rows).collect();
        indices.sort_by(|&a, &b| match (column, order) {
            (Column::Float(v), SortOrder::Descending) => match (v[a].is_nan(), v[b].is_nan()) {
                (false, false) => nan_last(v[b], v[a]),
                _ => nan_last(v[a], v[b]),
            },
            (_, SortOrder::Descending) => column.compare(b, a),
            (_, SortOrder::Ascending) => column.compare(a, b),
        });
        Ok(indices)
    }

    fn same_schema(&self, other: &Table) -> bool {
        self.names == other.names
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.kind() == b.kind())
    }

    /// Vertical concatenation. Row counts are summed first and every column
    /// is allocated once before filling.
    ///
    /// All tables must share column names, order and kinds.
    pub fn concat(tables: &[Table]) -> Result<Table> {
        let Some(first) = tables.first() else {
            return Ok(Table::new());
        };
        if let Some(pos) = tables.iter().position(|t| !first.same_schema(t)) {
            return Err(SurveyError::integrity(format!(
                "table {pos} has columns {:?}, expected {:?}",
                tables[pos].names, first.names
            )));
        }

        let total: usize = tables.iter().map(Table::num_rows).sum();
        let mut columns: Vec<Column> = first
            .columns
            .iter()
            .map(|c| Column::with_capacity(c.kind(), total))
            .collect();
        for table in tables {
            for (dst, src) in columns.iter_mut().zip(&table.columns) {
                let extended = dst.extend_from(src);
                debug_assert!(extended);
            }
        }
        Ok(Table {
            names: first.names.clone(),
            columns,
            rows: total,
        })
    }
}
