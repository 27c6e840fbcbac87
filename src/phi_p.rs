use nalgebra::{DMatrix, DVector};

use crate::design::{Design, SortedRow};

/// A design together with its matrix of pairwise distances raised to `-p`.
///
/// The two only change together, through [`IncrementalPhiP::accept`].
/// Evaluating a candidate row costs O(N k) instead of the O(N^2 k) of a full
/// recomputation because only the candidate's own distances change.
#[derive(Debug, Clone)]
pub struct IncrementalPhiP {
    design: Design,
    inv_dist: DMatrix<f64>,
    total: f64,
    p: f64,
}

/// A scored replacement of one row, ready to be accepted.
#[derive(Debug, Clone)]
pub struct CandidateMove {
    row: usize,
    values: SortedRow,
    terms: DVector<f64>,
    delta: f64,
    criterion: f64,
}

impl CandidateMove {
    pub fn criterion(&self) -> f64 {
        self.criterion
    }

    /// Strictly lowers phiP.
    ///
    /// Decided on the changed row's own terms: every other entry of the
    /// matrix is shared by both designs.
    pub fn improves(&self) -> bool {
        self.delta < 0.0
    }
}

impl IncrementalPhiP {
    pub fn new(design: Design, p: f64) -> Self {
        let n = design.nrows();
        let mut inv_dist = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let v = inv_distance(design.row(i), design.row(j), p);
                inv_dist[(i, j)] = v;
                inv_dist[(j, i)] = v;
            }
        }
        let total = upper_sum(&inv_dist);
        Self {
            design,
            inv_dist,
            total,
            p,
        }
    }

    pub fn criterion(&self) -> f64 {
        self.total.powf(1.0 / self.p)
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    pub fn into_design(self) -> Design {
        self.design
    }

    pub fn distances(&self) -> &DMatrix<f64> {
        &self.inv_dist
    }

    /// Scores `values` as a replacement for row `row` without changing anything.
    pub fn evaluate_candidate(&self, row: usize, values: SortedRow) -> CandidateMove {
        let n = self.design.nrows();
        let terms = DVector::from_fn(n, |j, _| {
            if j == row {
                0.0
            } else {
                inv_distance(&values, self.design.row(j), self.p)
            }
        });
        let delta = terms.sum() - self.inv_dist.row(row).sum();
        CandidateMove {
            row,
            values,
            terms,
            delta,
            criterion: (self.total + delta).max(0.0).powf(1.0 / self.p),
        }
    }

    /// Applies a move to the design and the distance matrix together.
    pub fn accept(&mut self, mv: CandidateMove) {
        let CandidateMove {
            row, values, terms, ..
        } = mv;
        self.inv_dist.set_row(row, &terms.transpose());
        self.inv_dist.set_column(row, &terms);
        self.design.set_row(row, values);
        // resum so rounding from repeated add/subtract never accumulates
        self.total = upper_sum(&self.inv_dist);
    }

    /// Smallest pairwise Euclidean distance in grid units.
    pub fn min_distance(&self) -> f64 {
        let max_inv = self
            .inv_dist
            .iter()
            .cloned()
            .fold(0.0_f64, f64::max);
        if max_inv == 0.0 {
            f64::INFINITY
        } else {
            max_inv.powf(-1.0 / self.p)
        }
    }
}

fn inv_distance(a: &[usize], b: &[usize], p: f64) -> f64 {
    let d2: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let diff = x as f64 - y as f64;
            diff * diff
        })
        .sum();
    d2.powf(-p / 2.0)
}

fn upper_sum(m: &DMatrix<f64>) -> f64 {
    let n = m.nrows();
    (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .map(|idx| m[idx])
        .sum()
}

/// phiP of the rows of a real-valued point matrix, computed from scratch.
///
/// Works in logarithms with the largest term factored out, so distances
/// below 1 raised to a large `p` do not overflow before the root is taken.
pub fn phi_p(points: &DMatrix<f64>, p: f64) -> f64 {
    let n = points.nrows();
    let mut logs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let d2 = (points.row(i) - points.row(j)).norm_squared();
            logs.push(-p / 2.0 * d2.ln());
        }
    }
    let largest = logs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !largest.is_finite() {
        // no pairs gives 0, a repeated point gives infinity
        return largest.exp();
    }
    let scaled: f64 = logs.iter().map(|&l| (l - largest).exp()).sum();
    ((largest + scaled.ln()) / p).exp()
}

/// Smallest pairwise Euclidean distance between the rows of `points`.
pub fn min_distance(points: &DMatrix<f64>) -> f64 {
    let n = points.nrows();
    let mut best = f64::INFINITY;
    for i in 0..n {
        for j in (i + 1)..n {
            best = best.min((points.row(i) - points.row(j)).norm());
        }
    }
    best
}
