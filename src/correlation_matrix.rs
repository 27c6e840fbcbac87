use nalgebra::{DMatrix, DVector};

use crate::block_layout::BlockLayout;

/// Pearson correlations between the columns of a design.
///
/// A column with zero variance correlates 0 with every column, itself included.
#[derive(Default, Debug, Clone)]
pub struct CorrelationMatrix {
    pub correlation: DMatrix<f64>,
}

impl CorrelationMatrix {
    pub fn from_design(design: &DMatrix<f64>) -> Self {
        let cross = centered_cross_products(design);
        let norms = column_norms(design, &cross);
        let k = design.ncols();
        let correlation = DMatrix::from_fn(k, k, |c, d| pearson(cross[(c, d)], norms[c], norms[d]));
        Self { correlation }
    }

    /// The correlations with every within-block sub-block set to zero.
    pub fn between_blocks(&self, layout: &BlockLayout) -> DMatrix<f64> {
        let mut masked = self.correlation.clone();
        for block in 0..layout.nblocks() {
            let range = layout.range(block);
            masked
                .view_mut((range.start, range.start), (range.len(), range.len()))
                .fill(0.0);
        }
        masked
    }

    /// Sum of squared between-block correlations, each pair counted twice.
    pub fn criterion(&self, layout: &BlockLayout) -> f64 {
        self.between_blocks(layout).norm_squared()
    }
}

fn centered_cross_products(design: &DMatrix<f64>) -> DMatrix<f64> {
    let (n, k) = design.shape();
    let means: Vec<f64> = (0..k).map(|c| design.column(c).mean()).collect();
    let centered = DMatrix::from_fn(n, k, |i, c| design[(i, c)] - means[c]);
    centered.tr_mul(&centered)
}

/// Square roots of the column sums of squares, forced to 0 for constant columns.
///
/// A constant column whose value has no exact binary form gets a slightly
/// wrong mean, which leaves a tiny identical residual in every run instead
/// of zeros. Deciding on the column's range keeps such columns at 0.
fn column_norms(design: &DMatrix<f64>, cross: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(design.ncols(), |c, _| {
        let column = design.column(c);
        if column.max() == column.min() {
            0.0
        } else {
            cross[(c, c)].sqrt()
        }
    })
}

fn pearson(cross: f64, norm_c: f64, norm_d: f64) -> f64 {
    let denom = norm_c * norm_d;
    if denom > 0.0 {
        cross / denom
    } else {
        0.0
    }
}

/// A design under block swaps, with its between-block criterion kept current.
///
/// Swapping one block's values between two runs leaves every column's mean
/// and variance alone, so only the cross products between the swapped
/// block's columns and the other blocks' columns move. Each moves by
/// `-(a1 - a2) * (b1 - b2)`.
#[derive(Debug, Clone)]
pub struct IncrementalCorrelation {
    design: DMatrix<f64>,
    layout: BlockLayout,
    cross: DMatrix<f64>,
    norms: DVector<f64>,
    total: f64,
}

/// A scored block swap between two runs.
#[derive(Debug, Clone, Copy)]
pub struct SwapMove {
    first: usize,
    second: usize,
    block: usize,
    criterion: f64,
}

impl SwapMove {
    pub fn criterion(&self) -> f64 {
        self.criterion
    }
}

impl IncrementalCorrelation {
    pub fn new(design: DMatrix<f64>, layout: BlockLayout) -> Self {
        let cross = centered_cross_products(&design);
        // swaps permute each column, so constancy never changes
        let norms = column_norms(&design, &cross);
        let mut state = Self {
            design,
            layout,
            cross,
            norms,
            total: 0.0,
        };
        state.total = state.full_total();
        state
    }

    pub fn criterion(&self) -> f64 {
        self.total
    }

    pub fn design(&self) -> &DMatrix<f64> {
        &self.design
    }

    pub fn into_design(self) -> DMatrix<f64> {
        self.design
    }

    fn full_total(&self) -> f64 {
        let k = self.design.ncols();
        let mut total = 0.0;
        for c in 0..k {
            for d in 0..k {
                if !self.layout.same_block(c, d) {
                    let r = pearson(self.cross[(c, d)], self.norms[c], self.norms[d]);
                    total += r * r;
                }
            }
        }
        total
    }

    /// The change to `cross[(c, d)]` when `block` is swapped between the two runs.
    fn shift(&self, first: usize, second: usize, c: usize, d: usize) -> f64 {
        let dc = self.design[(first, c)] - self.design[(second, c)];
        let dd = self.design[(first, d)] - self.design[(second, d)];
        -dc * dd
    }

    /// Scores swapping `block`'s values between runs `first` and `second`.
    pub fn evaluate_swap(&self, first: usize, second: usize, block: usize) -> SwapMove {
        let mut delta = 0.0;
        for c in self.layout.range(block) {
            for d in 0..self.design.ncols() {
                if self.layout.same_block(c, d) {
                    continue;
                }
                let old = pearson(self.cross[(c, d)], self.norms[c], self.norms[d]);
                let new = pearson(
                    self.cross[(c, d)] + self.shift(first, second, c, d),
                    self.norms[c],
                    self.norms[d],
                );
                delta += new * new - old * old;
            }
        }
        SwapMove {
            first,
            second,
            block,
            // both triangles
            criterion: self.total + 2.0 * delta,
        }
    }

    /// Performs the swap, keeping the cross products and criterion in step.
    pub fn accept(&mut self, mv: SwapMove) {
        let SwapMove {
            first,
            second,
            block,
            ..
        } = mv;
        let range = self.layout.range(block);
        for c in range.clone() {
            for d in 0..self.design.ncols() {
                if self.layout.same_block(c, d) {
                    continue;
                }
                let updated = self.cross[(c, d)] + self.shift(first, second, c, d);
                self.cross[(c, d)] = updated;
                self.cross[(d, c)] = updated;
            }
        }
        for c in range {
            self.design.swap((first, c), (second, c));
        }
        self.total = self.full_total();
    }
}
