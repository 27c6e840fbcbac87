use std::collections::HashSet;
use std::ops::Deref;

use nalgebra::DMatrix;

use crate::error::{DesignError, DesignResult};

/// One run of a simplex design: grid levels in non-decreasing order.
///
/// The ordering encodes the simplex constraint `x1 <= x2 <= ... <= xk`, so
/// every way of building or changing a row goes through a check that keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortedRow(Vec<usize>);

impl SortedRow {
    pub fn new(values: Vec<usize>) -> DesignResult<Self> {
        if values.windows(2).any(|w| w[0] > w[1]) {
            return Err(DesignError::InvalidParameter(format!(
                "row {:?} is not sorted ascending",
                values
            )));
        }
        Ok(Self(values))
    }

    pub fn from_unsorted(mut values: Vec<usize>) -> Self {
        values.sort_unstable();
        Self(values)
    }

    /// Replaces `values.len()` entries starting at `start`.
    ///
    /// Returns `None` if the result would not be sorted, which is exactly
    /// when the replacement falls outside `[row[start - 1], row[start + w]]`.
    pub fn with_window(&self, start: usize, values: &[usize]) -> Option<SortedRow> {
        let end = start + values.len();
        if end > self.0.len() || values.windows(2).any(|w| w[0] > w[1]) {
            return None;
        }
        if let (Some(&first), Some(&last)) = (values.first(), values.last()) {
            if start > 0 && self.0[start - 1] > first {
                return None;
            }
            if end < self.0.len() && last > self.0[end] {
                return None;
            }
        }
        let mut out = self.0.clone();
        out[start..end].copy_from_slice(values);
        Some(SortedRow(out))
    }
}

impl Deref for SortedRow {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

/// An N x k design on the integer grid `1..=levels`.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    rows: Vec<SortedRow>,
    k: usize,
    levels: usize,
}

impl Default for Design {
    /// An empty design on the smallest valid grid.
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            k: 0,
            levels: 2,
        }
    }
}

impl Design {
    pub fn from_rows(rows: Vec<SortedRow>, k: usize, levels: usize) -> DesignResult<Self> {
        if levels < 2 {
            return Err(DesignError::InvalidParameter(format!(
                "levels must be at least 2, got {}",
                levels
            )));
        }
        for row in &rows {
            if row.len() != k {
                return Err(DesignError::InvalidParameter(format!(
                    "row {:?} has {} columns, expected {}",
                    &row[..],
                    row.len(),
                    k
                )));
            }
            if row.iter().any(|&v| v < 1 || v > levels) {
                return Err(DesignError::InvalidParameter(format!(
                    "row {:?} has values outside 1..={}",
                    &row[..],
                    levels
                )));
            }
        }
        Ok(Self { rows, k, levels })
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.k
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn rows(&self) -> &[SortedRow] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &SortedRow {
        &self.rows[i]
    }

    /// Only called by the phiP evaluator, which keeps its distance matrix in step.
    pub(crate) fn set_row(&mut self, i: usize, row: SortedRow) {
        self.rows[i] = row;
    }

    pub fn rows_distinct(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows.iter().all(|row| seen.insert(row))
    }

    pub fn to_matrix(&self) -> DMatrix<usize> {
        DMatrix::from_fn(self.rows.len(), self.k, |i, j| self.rows[i][j])
    }

    /// Grid levels mapped onto `[0, 1]` by `(value - 1) / (levels - 1)`.
    pub fn scaled(&self) -> DMatrix<f64> {
        let span = (self.levels - 1) as f64;
        DMatrix::from_fn(self.rows.len(), self.k, |i, j| {
            (self.rows[i][j] - 1) as f64 / span
        })
    }

    /// Rows in lexicographic order, for stable printing and comparison.
    pub fn as_sorted(&self) -> DMatrix<usize> {
        let mut rows = self.rows.clone();
        rows.sort();
        DMatrix::from_fn(rows.len(), self.k, |i, j| rows[i][j])
    }
}
