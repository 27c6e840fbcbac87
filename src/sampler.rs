use std::collections::HashSet;

use rand::seq::index;
use rand::Rng;
use tracing::{debug, trace};

use crate::design::{Design, SortedRow};
use crate::error::{DesignError, DesignResult};
use crate::neighbors::{multiset_count, OrderedNeighbors};

/// Number of replacement batches drawn after the first before giving up.
pub const MAX_RETRIES: usize = 10;

/// Draws random feasible points (sorted k-tuples over `1..=levels`) on the
/// discretized simplex.
#[derive(Debug, Clone, Copy)]
pub struct GridPointSampler {
    k: usize,
    levels: usize,
}

impl GridPointSampler {
    pub fn new(k: usize, levels: usize) -> DesignResult<Self> {
        if k == 0 {
            return Err(DesignError::InvalidParameter("k must be at least 1".into()));
        }
        if levels < 2 {
            return Err(DesignError::InvalidParameter(format!(
                "levels must be at least 2, got {}",
                levels
            )));
        }
        Ok(Self { k, levels })
    }

    /// How many distinct sorted rows the grid holds, `C(levels + k - 1, k)`.
    pub fn feasible_rows(&self) -> u128 {
        multiset_count(self.levels as u128, self.k as u128)
    }

    /// One point: k uniform draws from `1..=levels`, sorted.
    pub fn sample_point<R: Rng + ?Sized>(&self, rng: &mut R) -> SortedRow {
        let values = (0..self.k).map(|_| rng.gen_range(1..=self.levels)).collect();
        SortedRow::from_unsorted(values)
    }

    /// `n` pairwise distinct points.
    ///
    /// Rows are drawn in batches and deduplicated against every row kept so
    /// far. When `n` is at least half of the grid the rows are instead drawn
    /// without replacement from the full enumeration, so a request for every
    /// feasible row still finishes.
    pub fn sample_design<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> DesignResult<Design> {
        let available = self.feasible_rows();
        if n as u128 > available {
            return Err(DesignError::InfeasibleDesign {
                requested: n,
                available,
            });
        }

        let rows = if (n as u128).saturating_mul(2) >= available {
            self.sample_dense(n, available as usize, rng)
        } else {
            self.sample_batches(n, rng)?
        };
        Design::from_rows(rows, self.k, self.levels)
    }

    fn sample_batches<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> DesignResult<Vec<SortedRow>> {
        let mut seen: HashSet<SortedRow> = HashSet::with_capacity(n);
        let mut rows = Vec::with_capacity(n);
        let mut retries = 0;

        loop {
            let missing = n - rows.len();
            for _ in 0..missing {
                let point = self.sample_point(rng);
                if seen.insert(point.clone()) {
                    rows.push(point);
                }
            }
            if rows.len() == n {
                break;
            }
            if retries == MAX_RETRIES {
                return Err(DesignError::SamplingExhaustion {
                    requested: n,
                    obtained: rows.len(),
                    retries,
                });
            }
            retries += 1;
            trace!("resampling {} duplicate rows (retry {})", n - rows.len(), retries);
        }

        debug!("sampled {} unique rows with {} retries", n, retries);
        Ok(rows)
    }

    fn sample_dense<R: Rng + ?Sized>(&self, n: usize, available: usize, rng: &mut R) -> Vec<SortedRow> {
        let all: Vec<Vec<usize>> = OrderedNeighbors::new(self.k, 1, self.levels).collect();
        debug!("drawing {} of {} enumerated rows", n, available);
        index::sample(rng, all.len(), n)
            .into_iter()
            .map(|i| SortedRow::from_unsorted(all[i].clone()))
            .collect()
    }
}
