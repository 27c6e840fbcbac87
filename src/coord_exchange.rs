/*
 * coord_exchange.rs - Maximin designs on a discretized simplex
 * Coordinate exchange over windows of each run, minimizing the phiP criterion,
 * repeated over independent random starts.
 */

use derive_builder::Builder;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::design::Design;
use crate::design_result::ExchangeResult;
use crate::error::{DesignError, DesignResult};
use crate::neighbors::OrderedNeighbors;
use crate::phi_p::{self, IncrementalPhiP};
use crate::random_type::RandomType;
use crate::sampler::GridPointSampler;

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(error = "DesignError"))]
pub struct ExchangeParams {
    /* k is the number of factors, the width of each run */
    pub k: usize,

    /* n is the number of runs */
    pub n: usize,

    /* levels is the number of grid points per factor (l) */
    pub levels: usize,

    /* cords is the width of the coordinate window exchanged at once */
    #[builder(default = "1")]
    pub cords: usize,

    /* restarts is the number of independent random starts */
    #[builder(default = "1")]
    pub restarts: usize,

    /* phi_p is the exponent p of the phiP criterion */
    #[builder(default = "50.0")]
    pub phi_p: f64,

    /* tolerance stops a start once a sweep improves phiP by less than this */
    #[builder(default = "1e-6")]
    pub tolerance: f64,

    #[builder(default)]
    pub random_type: RandomType,

    /* parallel runs the restarts on the rayon pool */
    #[builder(default = "false")]
    pub parallel: bool,
}

impl ExchangeParams {
    pub fn validate(&self) -> DesignResult<()> {
        let invalid = |msg: String| Err(DesignError::InvalidParameter(msg));
        if self.k == 0 {
            return invalid("k must be at least 1".into());
        }
        if self.n == 0 {
            return invalid("n must be at least 1".into());
        }
        if self.levels < 2 {
            return invalid(format!("levels must be at least 2, got {}", self.levels));
        }
        if self.cords == 0 || self.cords > self.k {
            return invalid(format!("cords must be in 1..={}, got {}", self.k, self.cords));
        }
        if self.restarts == 0 {
            return invalid("restarts must be at least 1".into());
        }
        if !(self.phi_p.is_finite() && self.phi_p > 0.0) {
            return invalid(format!("phi_p must be positive, got {}", self.phi_p));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return invalid(format!("tolerance must be positive, got {}", self.tolerance));
        }
        Ok(())
    }
}

/// Best design of one random start.
#[derive(Debug, Clone)]
struct RestartOutcome {
    design: Design,
    criterion: f64,
    sweep_trace: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CoordinateExchange {
    params: ExchangeParams,
    sampler: GridPointSampler,
}

impl CoordinateExchange {
    pub fn new(params: ExchangeParams) -> DesignResult<Self> {
        params.validate()?;
        let sampler = GridPointSampler::new(params.k, params.levels)?;
        let available = sampler.feasible_rows();
        if params.n as u128 > available {
            return Err(DesignError::InfeasibleDesign {
                requested: params.n,
                available,
            });
        }
        Ok(Self { params, sampler })
    }

    pub fn params(&self) -> &ExchangeParams {
        &self.params
    }

    pub fn optimize(&self) -> DesignResult<ExchangeResult> {
        self.optimize_with(|_, _| {})
    }

    /// Runs every restart and keeps the design with the lowest phiP.
    ///
    /// `on_update` receives the 1-based restart number and the best phiP so far.
    pub fn optimize_with<F>(&self, mut on_update: F) -> DesignResult<ExchangeResult>
    where
        F: FnMut(usize, f64),
    {
        let mut tally = RestartTally::with_capacity(self.params.restarts);

        if self.params.parallel {
            let outcomes = (0..self.params.restarts)
                .into_par_iter()
                .map(|i| self.run_restart(i))
                .collect::<DesignResult<Vec<_>>>()?;
            for (i, outcome) in outcomes.into_iter().enumerate() {
                let best = tally.absorb(i, outcome);
                on_update(i + 1, best);
            }
        } else {
            for i in 0..self.params.restarts {
                let outcome = self.run_restart(i)?;
                let best = tally.absorb(i, outcome);
                on_update(i + 1, best);
            }
        }

        tally.finish()
    }

    fn run_restart(&self, index: usize) -> DesignResult<RestartOutcome> {
        let mut rng = self.params.random_type.stream(index).rng();
        let initial = self.sampler.sample_design(self.params.n, &mut rng)?;
        let mut state = IncrementalPhiP::new(initial, self.params.phi_p);

        let sweep_trace = self.local_search(&mut state);
        // resummed on accept, so this matches the last trace entry exactly
        let criterion = self.reported(&state);
        info!(
            "restart {}: phiP {:.6} after {} sweeps",
            index + 1,
            criterion,
            sweep_trace.len() - 1
        );

        Ok(RestartOutcome {
            design: state.into_design(),
            criterion,
            sweep_trace,
        })
    }

    /// phiP on the `[0, 1]` scale; grid distances are `levels - 1` times larger.
    fn reported(&self, state: &IncrementalPhiP) -> f64 {
        state.criterion() * (self.params.levels - 1) as f64
    }

    /// Alternating forward and backward sweeps until one accepts nothing or
    /// improves by less than the tolerance. Returns phiP before the first
    /// sweep and after each one.
    fn local_search(&self, state: &mut IncrementalPhiP) -> Vec<f64> {
        let mut trace_values = vec![self.reported(state)];
        let mut forward = true;

        loop {
            let accepted = self.sweep(state, forward);
            let previous = trace_values[trace_values.len() - 1];
            let current = self.reported(state);
            trace_values.push(current);
            debug!(
                "{} sweep: {} exchanges, phiP {:.6}",
                if forward { "forward" } else { "backward" },
                accepted,
                current
            );

            if accepted == 0 || previous - current < self.params.tolerance {
                break;
            }
            forward = !forward;
        }

        trace_values
    }

    fn sweep(&self, state: &mut IncrementalPhiP, forward: bool) -> usize {
        let n = state.design().nrows();
        let rows: Vec<usize> = if forward {
            (0..n).collect()
        } else {
            (0..n).rev().collect()
        };

        let mut accepted = 0;
        for row in rows {
            for start in (0..self.params.k).step_by(self.params.cords) {
                accepted += self.exchange_window(state, row, start);
            }
        }
        accepted
    }

    /// Tries every ordered tuple that fits between the window's neighbours.
    ///
    /// Each strict improvement is applied immediately and later candidates
    /// of the same window are compared against it.
    fn exchange_window(&self, state: &mut IncrementalPhiP, row: usize, start: usize) -> usize {
        let k = self.params.k;
        let width = self.params.cords.min(k - start);
        let end = start + width;

        let current = state.design().row(row);
        let lower = if start == 0 { 1 } else { current[start - 1] };
        let upper = if end >= k { self.params.levels } else { current[end] };
        if lower == upper {
            return 0;
        }

        let mut accepted = 0;
        for candidate in OrderedNeighbors::new(width, lower, upper) {
            let current = state.design().row(row);
            if current[start..end] == candidate[..] {
                continue;
            }
            let Some(values) = current.with_window(start, &candidate) else {
                continue;
            };
            let mv = state.evaluate_candidate(row, values);
            if mv.improves() {
                trace!("run {} window {}: {:?} -> phiP {:.6}", row, start, candidate, mv.criterion());
                state.accept(mv);
                accepted += 1;
            }
        }
        accepted
    }
}

/// Running best over restarts.
struct RestartTally {
    best: Option<(usize, RestartOutcome)>,
    criteria: Vec<f64>,
}

impl RestartTally {
    fn with_capacity(restarts: usize) -> Self {
        Self {
            best: None,
            criteria: Vec::with_capacity(restarts),
        }
    }

    fn absorb(&mut self, index: usize, outcome: RestartOutcome) -> f64 {
        self.criteria.push(outcome.criterion);
        let better = match &self.best {
            Some((_, best)) => outcome.criterion < best.criterion,
            None => true,
        };
        if better {
            self.best = Some((index, outcome));
        }
        self.best
            .as_ref()
            .map(|(_, best)| best.criterion)
            .unwrap_or(f64::INFINITY)
    }

    fn finish(self) -> DesignResult<ExchangeResult> {
        let (best_restart, outcome) = self
            .best
            .ok_or_else(|| DesignError::InvalidParameter("no restarts were run".into()))?;
        let design = outcome.design.scaled();
        let min_distance = phi_p::min_distance(&design);

        Ok(ExchangeResult {
            design,
            grid_design: outcome.design,
            criterion: outcome.criterion,
            restart_criteria: self.criteria,
            best_restart,
            sweep_trace: outcome.sweep_trace,
            min_distance,
        })
    }
}

pub fn optimize_design(params: ExchangeParams) -> DesignResult<ExchangeResult> {
    CoordinateExchange::new(params)?.optimize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::SortedRow;
    use rstest::rstest;

    fn params(k: usize, n: usize, levels: usize, cords: usize, restarts: usize, seed: u64) -> ExchangeParams {
        ExchangeParamsBuilder::default()
            .k(k)
            .n(n)
            .levels(levels)
            .cords(cords)
            .restarts(restarts)
            .phi_p(15.0)
            .random_type(RandomType::Seeded(seed))
            .build()
            .unwrap()
    }

    fn assert_simplex_design(design: &Design) {
        assert!(design.rows_distinct());
        for row in design.rows() {
            assert!(row.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_builder_defaults() {
        let p = ExchangeParamsBuilder::default().k(3).n(10).levels(5).build().unwrap();
        assert_eq!(p.cords, 1);
        assert_eq!(p.restarts, 1);
        assert_eq!(p.phi_p, 50.0);
        assert_eq!(p.tolerance, 1e-6);
        assert_eq!(p.random_type, RandomType::Entropy);
        assert!(!p.parallel);
    }

    #[test]
    fn test_builder_missing_field() {
        let err = ExchangeParamsBuilder::default().k(3).n(10).build().unwrap_err();
        assert!(matches!(err, DesignError::Builder(_)));
    }

    #[rstest]
    #[case(0, 10, 5, 1)]
    #[case(3, 0, 5, 1)]
    #[case(3, 10, 1, 1)]
    #[case(3, 10, 5, 0)]
    #[case(3, 10, 5, 4)]
    fn test_invalid_parameters(#[case] k: usize, #[case] n: usize, #[case] levels: usize, #[case] cords: usize) {
        let p = ExchangeParams {
            k,
            n,
            levels,
            cords,
            restarts: 1,
            phi_p: 50.0,
            tolerance: 1e-6,
            random_type: RandomType::Seeded(0),
            parallel: false,
        };
        assert!(matches!(
            CoordinateExchange::new(p),
            Err(DesignError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_invalid_exponent_and_tolerance() {
        let mut p = params(3, 10, 5, 1, 1, 0);
        p.phi_p = 0.0;
        assert!(CoordinateExchange::new(p.clone()).is_err());
        p.phi_p = 10.0;
        p.tolerance = -1.0;
        assert!(CoordinateExchange::new(p).is_err());
    }

    #[test]
    fn test_infeasible_run_count() {
        let err = CoordinateExchange::new(params(2, 7, 3, 1, 1, 0)).unwrap_err();
        assert_eq!(
            err,
            DesignError::InfeasibleDesign {
                requested: 7,
                available: 6
            }
        );
    }

    #[test]
    fn test_sweep_trace_never_increases() {
        let result = optimize_design(params(3, 12, 7, 1, 1, 11)).unwrap();
        assert!(result.sweep_trace.len() >= 2);
        for w in result.sweep_trace.windows(2) {
            assert!(w[1] <= w[0] * (1.0 + 1e-12), "trace went up: {:?}", result.sweep_trace);
        }
        assert_simplex_design(&result.grid_design);
    }

    #[test]
    fn test_search_improves_initial_design() {
        let result = optimize_design(params(2, 8, 9, 1, 1, 5)).unwrap();
        let first = result.sweep_trace[0];
        let last = *result.sweep_trace.last().unwrap();
        assert!(last <= first);
        assert!((result.criterion - last).abs() <= 1e-9 * last);
    }

    #[test]
    fn test_full_row_window() {
        let result = optimize_design(params(3, 6, 4, 3, 1, 2)).unwrap();
        assert_eq!(result.design.shape(), (6, 3));
        assert_simplex_design(&result.grid_design);
    }

    #[test]
    fn test_uneven_window_tiling() {
        // windows of width 2 over 5 coordinates: starts 0, 2, 4
        let result = optimize_design(params(5, 10, 4, 2, 1, 8)).unwrap();
        assert_simplex_design(&result.grid_design);
    }

    #[test]
    fn test_every_feasible_row() {
        // C(5 + 2, 3) = 35 rows: the search has nothing to gain but must still finish
        let result = optimize_design(params(3, 35, 5, 1, 1, 4)).unwrap();
        assert_eq!(result.grid_design.nrows(), 35);
        assert_simplex_design(&result.grid_design);
    }

    #[test]
    fn test_best_is_minimum_of_restarts() {
        let mut calls = Vec::new();
        let result = CoordinateExchange::new(params(3, 10, 5, 1, 4, 21))
            .unwrap()
            .optimize_with(|i, best| calls.push((i, best)))
            .unwrap();
        assert_eq!(result.restart_criteria.len(), 4);
        let min = result
            .restart_criteria
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(min, result.criterion);
        assert_eq!(result.restart_criteria[result.best_restart], result.criterion);
        assert_eq!(calls.iter().map(|c| c.0).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(calls.windows(2).all(|w| w[1].1 <= w[0].1));
    }

    fn hand_state(rows: &[&[usize]], levels: usize, p: f64) -> IncrementalPhiP {
        let k = rows[0].len();
        let rows = rows
            .iter()
            .map(|r| SortedRow::new(r.to_vec()).unwrap())
            .collect();
        IncrementalPhiP::new(Design::from_rows(rows, k, levels).unwrap(), p)
    }

    #[test]
    fn test_window_scan_rebases_on_each_accept() {
        // run 0 sits at 2 between fixed runs at 1 and 7; with p = 2 the values
        // 3, 4 and 5 score 0.3125, 0.2222 and 0.3125 against 1.04 for 2
        let search = CoordinateExchange::new(params(1, 3, 7, 1, 1, 0)).unwrap();
        let mut state = hand_state(&[&[2], &[1], &[7]], 7, 2.0);
        let accepted = search.exchange_window(&mut state, 0, 0);
        // 3 beats 2, then 4 beats 3; 5 only ties 3 and is rejected against 4
        assert_eq!(accepted, 2);
        assert_eq!(&state.design().row(0)[..], &[4]);
        let expected = (2.0_f64 / 9.0 + 1.0 / 36.0).sqrt();
        assert!((state.criterion() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_pinned_window_is_skipped() {
        // the middle coordinate of [2, 2, 2] must stay between 2 and 2
        let search = CoordinateExchange::new(params(3, 2, 3, 1, 1, 0)).unwrap();
        let mut state = hand_state(&[&[2, 2, 2], &[1, 1, 3]], 3, 4.0);
        let before = state.criterion();
        assert_eq!(search.exchange_window(&mut state, 0, 1), 0);
        assert_eq!(&state.design().row(0)[..], &[2, 2, 2]);
        assert_eq!(state.criterion(), before);
    }

    #[test]
    fn test_large_exponent_reports_finite_criteria() {
        // scaled distances fall to 1/11, and (1/11)^-400 overflows
        let mut p = params(2, 30, 12, 1, 2, 1);
        p.phi_p = 400.0;
        let result = optimize_design(p).unwrap();
        assert!(result.restart_criteria.iter().all(|c| c.is_finite() && *c > 0.0));
        assert_eq!(Some(&result.criterion), result.sweep_trace.last());
        let recomputed = phi_p::phi_p(&result.design, 400.0);
        assert!((recomputed - result.criterion).abs() <= 1e-9 * result.criterion);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = optimize_design(params(3, 10, 6, 1, 3, 77)).unwrap();
        let mut p = params(3, 10, 6, 1, 3, 77);
        p.parallel = true;
        let parallel = optimize_design(p).unwrap();
        assert_eq!(sequential.grid_design, parallel.grid_design);
        assert_eq!(sequential.restart_criteria, parallel.restart_criteria);
    }
}
