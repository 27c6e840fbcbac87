use nalgebra::DMatrix;

use crate::design::Design;

/// Represents the result of a coordinate-exchange search for a maximin simplex design.
///
/// # Fields
///
/// * `design` - The best design found, rescaled to `[0, 1]`
/// * `grid_design` - The same design on the integer grid `1..=levels`
/// * `criterion` - phiP of the rescaled best design
/// * `restart_criteria` - phiP reached by each random restart, in restart order
/// * `best_restart` - Index of the restart that produced the best design
/// * `sweep_trace` - phiP after each sweep of the winning restart, starting with its initial design
/// * `min_distance` - Smallest pairwise distance between runs of the rescaled design
#[derive(Debug, Default, Clone)]
pub struct ExchangeResult {
    pub design: DMatrix<f64>,
    pub grid_design: Design,
    pub criterion: f64,
    pub restart_criteria: Vec<f64>,
    pub best_restart: usize,
    pub sweep_trace: Vec<f64>,
    pub min_distance: f64,
}

/// Represents the result of annealing the run order of a multi-block design.
///
/// # Fields
///
/// * `design` - The working design when the temperature fell below its final value
/// * `criterion_trace` - Best inter-block correlation criterion (halved) after each temperature level
/// * `initial_criterion` - Criterion of the input design (halved)
/// * `final_criterion` - Criterion of the returned design (halved)
/// * `accepted_moves` - Number of block swaps that were kept
#[derive(Debug, Default, Clone)]
pub struct AnnealResult {
    pub design: DMatrix<f64>,
    pub criterion_trace: Vec<f64>,
    pub initial_criterion: f64,
    pub final_criterion: f64,
    pub accepted_moves: usize,
}
