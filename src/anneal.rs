/*
 * anneal.rs - Run-order optimization for combined multi-block designs
 * Simulated annealing over block swaps between runs, minimizing the squared
 * correlation between factors of different blocks.
 */

use derive_builder::Builder;
use nalgebra::DMatrix;
use rand::Rng;
use tracing::{debug, info, trace};

use crate::block_layout::BlockLayout;
use crate::correlation_matrix::IncrementalCorrelation;
use crate::design_result::AnnealResult;
use crate::error::{DesignError, DesignResult};
use crate::random_type::RandomType;

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(error = "DesignError"))]
pub struct AnnealParams {
    /* t_initial is the starting temperature */
    #[builder(default = "1.0")]
    pub t_initial: f64,

    /* t_final stops the schedule once the temperature reaches it */
    #[builder(default = "1e-3")]
    pub t_final: f64,

    /* decay multiplies the temperature after each level */
    #[builder(default = "0.95")]
    pub decay: f64,

    /* iterations is the number of trial swaps per temperature level */
    #[builder(default = "100")]
    pub iterations: usize,

    #[builder(default)]
    pub random_type: RandomType,
}

impl AnnealParams {
    pub fn validate(&self) -> DesignResult<()> {
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(DesignError::InvalidParameter(format!(
                "decay must be in (0, 1), got {}",
                self.decay
            )));
        }
        if !(self.t_final > 0.0 && self.t_initial > self.t_final && self.t_initial.is_finite()) {
            return Err(DesignError::InvalidParameter(format!(
                "temperatures must satisfy t_initial > t_final > 0, got {} and {}",
                self.t_initial, self.t_final
            )));
        }
        Ok(())
    }

    /// How many temperature levels the schedule visits.
    pub fn levels(&self) -> usize {
        if self.validate().is_err() {
            return 0;
        }
        let mut t = self.t_initial;
        let mut count = 0;
        while t > self.t_final {
            count += 1;
            t *= self.decay;
        }
        count
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationAnnealer {
    params: AnnealParams,
}

impl CorrelationAnnealer {
    pub fn new(params: AnnealParams) -> DesignResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &AnnealParams {
        &self.params
    }

    pub fn optimize(&self, design: DMatrix<f64>, layout: &BlockLayout) -> DesignResult<AnnealResult> {
        self.optimize_with(design, layout, |_, _| {})
    }

    /// Anneals the run order of `design`.
    ///
    /// The reference for every trial is the best criterion accepted so far;
    /// an accepted swap, improving or not, becomes both the working design
    /// and the new reference. `on_update` receives the 1-based temperature
    /// level and the halved criterion after it.
    pub fn optimize_with<F>(
        &self,
        design: DMatrix<f64>,
        layout: &BlockLayout,
        mut on_update: F,
    ) -> DesignResult<AnnealResult>
    where
        F: FnMut(usize, f64),
    {
        if layout.ncols() != design.ncols() {
            return Err(DesignError::InvalidParameter(format!(
                "block sizes {:?} sum to {}, but the design has {} columns",
                layout.sizes(),
                layout.ncols(),
                design.ncols()
            )));
        }
        let nrows = design.nrows();
        if self.params.iterations > 0 && nrows < 2 {
            return Err(DesignError::InvalidParameter(format!(
                "swapping needs at least 2 runs, got {}",
                nrows
            )));
        }

        let mut rng = self.params.random_type.rng();
        let mut state = IncrementalCorrelation::new(design, layout.clone());
        let mut best = state.criterion();
        let initial_criterion = best / 2.0;

        let mut criterion_trace = Vec::with_capacity(self.params.levels());
        let mut accepted_moves = 0;
        let mut temperature = self.params.t_initial;

        while temperature > self.params.t_final {
            for _ in 0..self.params.iterations {
                let first = rng.gen_range(0..nrows);
                let mut second = rng.gen_range(0..nrows - 1);
                if second >= first {
                    second += 1;
                }
                let block = rng.gen_range(0..layout.nblocks());

                let mv = state.evaluate_swap(first, second, block);
                let candidate = mv.criterion();
                let accept = candidate < best
                    || rng.gen::<f64>() < (-(candidate - best) / temperature).exp();
                if accept {
                    trace!("swap block {} of runs {} and {}: {:.6}", block, first, second, candidate);
                    state.accept(mv);
                    best = state.criterion();
                    accepted_moves += 1;
                }
            }

            criterion_trace.push(best / 2.0);
            debug!("temperature {:.6}: criterion {:.6}", temperature, best / 2.0);
            on_update(criterion_trace.len(), best / 2.0);
            temperature *= self.params.decay;
        }

        let final_criterion = best / 2.0;
        info!(
            "annealed {} levels: criterion {:.6} -> {:.6}, {} swaps kept",
            criterion_trace.len(),
            initial_criterion,
            final_criterion,
            accepted_moves
        );

        Ok(AnnealResult {
            design: state.into_design(),
            criterion_trace,
            initial_criterion,
            final_criterion,
            accepted_moves,
        })
    }
}

pub fn anneal_design(
    design: DMatrix<f64>,
    block_sizes: Vec<usize>,
    params: AnnealParams,
) -> DesignResult<AnnealResult> {
    let layout = BlockLayout::for_columns(block_sizes, design.ncols())?;
    CorrelationAnnealer::new(params)?.optimize(design, &layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation_matrix::CorrelationMatrix;
    use rstest::rstest;

    fn grid_design(nrows: usize, ncols: usize) -> DMatrix<f64> {
        // deterministic but uneven columns
        DMatrix::from_fn(nrows, ncols, |i, j| (((i + 1) * (j + 3) * 7 + j * j) % 11) as f64 / 10.0)
    }

    fn params(iterations: usize, seed: u64) -> AnnealParams {
        AnnealParamsBuilder::default()
            .t_initial(0.5)
            .t_final(0.01)
            .decay(0.8)
            .iterations(iterations)
            .random_type(RandomType::Seeded(seed))
            .build()
            .unwrap()
    }

    #[test]
    fn test_levels_counts_schedule() {
        let p = params(0, 0);
        // 0.5 * 0.8^n > 0.01 for n = 0..=17
        assert_eq!(p.levels(), 18);
    }

    #[rstest]
    #[case(1.0, 0.1, 1.0)]
    #[case(1.0, 0.1, 0.0)]
    #[case(0.1, 1.0, 0.9)]
    #[case(1.0, 0.0, 0.9)]
    #[case(1.0, 1.0, 0.9)]
    fn test_invalid_schedule(#[case] t_initial: f64, #[case] t_final: f64, #[case] decay: f64) {
        let p = AnnealParams {
            t_initial,
            t_final,
            decay,
            iterations: 10,
            random_type: RandomType::Seeded(0),
        };
        assert!(matches!(
            CorrelationAnnealer::new(p),
            Err(DesignError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_layout_must_match_columns() {
        let design = grid_design(10, 5);
        assert!(anneal_design(design, vec![3, 3], params(5, 0)).is_err());
    }

    #[test]
    fn test_single_run_cannot_swap() {
        let design = grid_design(1, 4);
        assert!(anneal_design(design.clone(), vec![2, 2], params(5, 0)).is_err());
        assert!(anneal_design(design, vec![2, 2], params(0, 0)).is_ok());
    }

    #[test]
    fn test_no_iterations_leaves_design_unchanged() {
        let design = grid_design(20, 6);
        let layout = BlockLayout::new(vec![3, 3]).unwrap();
        let initial = CorrelationMatrix::from_design(&design).criterion(&layout) / 2.0;
        let p = params(0, 1);
        let levels = p.levels();
        let result = anneal_design(design.clone(), vec![3, 3], p).unwrap();
        assert_eq!(result.design, design);
        assert_eq!(result.criterion_trace.len(), levels);
        assert!(result
            .criterion_trace
            .iter()
            .all(|&c| (c - initial).abs() < 1e-12));
        assert_eq!(result.accepted_moves, 0);
    }

    #[test]
    fn test_swaps_preserve_column_contents() {
        let design = grid_design(15, 4);
        let result = anneal_design(design.clone(), vec![2, 2], params(50, 3)).unwrap();
        assert_eq!(result.design.shape(), design.shape());
        for c in 0..4 {
            let mut before: Vec<f64> = design.column(c).iter().cloned().collect();
            let mut after: Vec<f64> = result.design.column(c).iter().cloned().collect();
            before.sort_by(|a, b| a.partial_cmp(b).unwrap());
            after.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_blocks_move_as_units() {
        // every run's block values must come from a single input run
        let design = grid_design(12, 5);
        let layout = BlockLayout::new(vec![2, 3]).unwrap();
        let result = anneal_design(design.clone(), vec![2, 3], params(40, 4)).unwrap();
        for block in 0..layout.nblocks() {
            let range = layout.range(block);
            for i in 0..result.design.nrows() {
                let piece = result.design.view((i, range.start), (1, range.len()));
                assert!((0..design.nrows())
                    .any(|j| design.view((j, range.start), (1, range.len())) == piece));
            }
        }
    }

    #[test]
    fn test_reported_criterion_matches_returned_design() {
        let design = grid_design(16, 4);
        let layout = BlockLayout::new(vec![2, 2]).unwrap();
        let result = anneal_design(design, vec![2, 2], params(30, 5)).unwrap();
        let recomputed = CorrelationMatrix::from_design(&result.design).criterion(&layout) / 2.0;
        assert!((recomputed - result.final_criterion).abs() < 1e-9);
        assert_eq!(Some(&result.final_criterion), result.criterion_trace.last());
    }

    #[test]
    fn test_cold_schedule_only_improves() {
        let design = grid_design(20, 6);
        let p = AnnealParamsBuilder::default()
            .t_initial(1e-9)
            .t_final(1e-10)
            .decay(0.5)
            .iterations(200)
            .random_type(RandomType::Seeded(8))
            .build()
            .unwrap();
        let result = anneal_design(design, vec![3, 3], p).unwrap();
        assert!(result.final_criterion <= result.initial_criterion + 1e-12);
        for w in result.criterion_trace.windows(2) {
            assert!(w[1] <= w[0] + 1e-12);
        }
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let design = grid_design(10, 4);
        let a = anneal_design(design.clone(), vec![1, 3], params(20, 9)).unwrap();
        let b = anneal_design(design, vec![1, 3], params(20, 9)).unwrap();
        assert_eq!(a.design, b.design);
        assert_eq!(a.criterion_trace, b.criterion_trace);
    }
}
