mod random_type;

pub mod anneal;
pub mod block_layout;
pub mod coord_exchange;
pub mod correlation_matrix;
pub mod design;
pub mod design_result;
pub mod error;
pub mod neighbors;
pub mod phi_p;
pub mod sampler;

pub use anneal::{AnnealParams, AnnealParamsBuilder, CorrelationAnnealer};
pub use block_layout::{combine_designs, BlockLayout};
pub use coord_exchange::{CoordinateExchange, ExchangeParams, ExchangeParamsBuilder};
pub use design::{Design, SortedRow};
pub use design_result::{AnnealResult, ExchangeResult};
pub use error::{DesignError, DesignResult};
pub use random_type::RandomType;

use nalgebra::DMatrix;

/// Finds a space-filling simplex design by running several random starts of
/// the coordinate-exchange search.
///
/// # Arguments
///
/// * `k` - Number of factors (columns); each run is a sorted k-tuple
/// * `n` - Number of runs (rows)
/// * `levels` - Number of grid levels per factor
/// * `cords` - Width of the coordinate window exchanged at once
/// * `restarts` - Number of random starts
/// * `phi_p` - Exponent p of the phiP criterion
/// * `tolerance` - Smallest per-sweep improvement that keeps a start going
/// * `seed` - Seed for reproducible runs; `None` draws from entropy
/// * `on_update` - Callback called after each start with its 1-based number and the best phiP so far
///
/// # Returns
///
/// Returns the best design rescaled to `[0, 1]`, its phiP and the phiP of every start
/// inside an `ExchangeResult`.
///
/// # Errors
///
/// Returns an error if a parameter is out of range, if `n` exceeds the number of
/// distinct sorted rows on the grid, or if unique rows cannot be sampled.
#[allow(clippy::too_many_arguments)]
pub fn find_best_design<F>(
    k: usize,
    n: usize,
    levels: usize,
    cords: usize,
    restarts: usize,
    phi_p: f64,
    tolerance: f64,
    seed: Option<u64>,
    on_update: F,
) -> DesignResult<ExchangeResult>
where
    F: FnMut(usize, f64),
{
    let params = ExchangeParamsBuilder::default()
        .k(k)
        .n(n)
        .levels(levels)
        .cords(cords)
        .restarts(restarts)
        .phi_p(phi_p)
        .tolerance(tolerance)
        .random_type(seed.map_or(RandomType::Entropy, RandomType::Seeded))
        .build()?;
    CoordinateExchange::new(params)?.optimize_with(on_update)
}

/// Reorders the runs of a combined multi-block design so that factors in
/// different blocks are as uncorrelated as possible.
///
/// # Arguments
///
/// * `design` - Combined design, one column per factor
/// * `block_sizes` - Number of columns in each block, left to right; must sum to the column count
/// * `t_initial` - Starting temperature
/// * `t_final` - Temperature at which annealing stops
/// * `decay` - Factor in `(0, 1)` applied to the temperature after each level
/// * `iterations` - Trial swaps per temperature level
/// * `seed` - Seed for reproducible runs; `None` draws from entropy
/// * `on_update` - Callback called after each temperature level with its 1-based number and the criterion
///
/// # Errors
///
/// Returns an error if the schedule or the block sizes are invalid.
#[allow(clippy::too_many_arguments)]
pub fn anneal_run_order<F>(
    design: DMatrix<f64>,
    block_sizes: Vec<usize>,
    t_initial: f64,
    t_final: f64,
    decay: f64,
    iterations: usize,
    seed: Option<u64>,
    on_update: F,
) -> DesignResult<AnnealResult>
where
    F: FnMut(usize, f64),
{
    let layout = BlockLayout::for_columns(block_sizes, design.ncols())?;
    let params = AnnealParamsBuilder::default()
        .t_initial(t_initial)
        .t_final(t_final)
        .decay(decay)
        .iterations(iterations)
        .random_type(seed.map_or(RandomType::Entropy, RandomType::Seeded))
        .build()?;
    CorrelationAnnealer::new(params)?.optimize_with(design, &layout, on_update)
}
