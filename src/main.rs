use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pretty_print_nalgebra::*;
use tracing::info;

use simplexgen::{
    combine_designs, AnnealParamsBuilder, CoordinateExchange, CorrelationAnnealer,
    ExchangeParams, ExchangeParamsBuilder, RandomType,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Seed for reproducible runs
    #[arg(global = true, long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a maximin design on the simplex grid
    Design(DesignArgs),
    /// Build one design per block, combine them and anneal the run order
    Anneal(AnnealArgs),
}

#[derive(Args, Debug, Clone)]
struct ExchangeArgs {
    /// Number of runs
    #[arg(short, long)]
    n: usize,

    /// Grid levels per factor
    #[arg(short, long, default_value_t = 11)]
    levels: usize,

    /// Width of the coordinate window
    #[arg(long, default_value_t = 1)]
    cords: usize,

    /// Random starts
    #[arg(short, long, default_value_t = 5)]
    restarts: usize,

    /// Exponent of the phiP criterion
    #[arg(long, default_value_t = 50.0)]
    phi_p: f64,

    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,

    /// Run restarts in parallel
    #[arg(long, default_value_t = false)]
    parallel: bool,
}

#[derive(Args, Debug)]
struct DesignArgs {
    /// Number of factors
    #[arg(short, long)]
    k: usize,

    #[command(flatten)]
    exchange: ExchangeArgs,
}

#[derive(Args, Debug)]
struct AnnealArgs {
    /// Factors per block, e.g. 3,3
    #[arg(short, long, value_delimiter = ',', required = true)]
    blocks: Vec<usize>,

    #[command(flatten)]
    exchange: ExchangeArgs,

    #[arg(long, default_value_t = 1.0)]
    t_initial: f64,

    #[arg(long, default_value_t = 1e-3)]
    t_final: f64,

    #[arg(long, default_value_t = 0.95)]
    decay: f64,

    /// Trial swaps per temperature level
    #[arg(long, default_value_t = 100)]
    iterations: usize,
}

fn exchange_params(k: usize, args: &ExchangeArgs, random_type: RandomType) -> Result<ExchangeParams> {
    let params = ExchangeParamsBuilder::default()
        .k(k)
        .n(args.n)
        .levels(args.levels)
        .cords(args.cords)
        .restarts(args.restarts)
        .phi_p(args.phi_p)
        .tolerance(args.tolerance)
        .random_type(random_type)
        .parallel(args.parallel)
        .build()?;
    Ok(params)
}

fn run_design(args: &DesignArgs, random_type: RandomType) -> Result<()> {
    let params = exchange_params(args.k, &args.exchange, random_type)?;
    let result = CoordinateExchange::new(params)
        .context("invalid design parameters")?
        .optimize_with(|restart, best| info!("restart {}: best phiP {:.6}", restart, best))?;

    println!("phiP: {:.6}", result.criterion);
    println!("min distance: {:.6}", result.min_distance);
    println!("phiP per restart: {:?}", result.restart_criteria);
    println!("design: {}", pretty_print!(&result.design));
    Ok(())
}

fn run_anneal(args: &AnnealArgs, random_type: RandomType) -> Result<()> {
    let mut parts = Vec::with_capacity(args.blocks.len());
    for (i, &k) in args.blocks.iter().enumerate() {
        let params = exchange_params(k, &args.exchange, random_type.stream(i * args.exchange.restarts))?;
        let result = CoordinateExchange::new(params)
            .with_context(|| format!("invalid parameters for block {}", i + 1))?
            .optimize()?;
        info!("block {}: phiP {:.6}", i + 1, result.criterion);
        parts.push(result.design);
    }
    let (combined, layout) = combine_designs(&parts)?;

    let params = AnnealParamsBuilder::default()
        .t_initial(args.t_initial)
        .t_final(args.t_final)
        .decay(args.decay)
        .iterations(args.iterations)
        .random_type(random_type)
        .build()?;
    let result = CorrelationAnnealer::new(params)
        .context("invalid annealing schedule")?
        .optimize(combined, &layout)?;

    println!(
        "criterion: {:.6} -> {:.6}",
        result.initial_criterion, result.final_criterion
    );
    println!("criterion per level: {:?}", result.criterion_trace);
    println!("design: {}", pretty_print!(&result.design));
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let random_type = cli.seed.map_or(RandomType::Entropy, RandomType::Seeded);

    match &cli.command {
        Commands::Design(args) => run_design(args, random_type),
        Commands::Anneal(args) => run_anneal(args, random_type),
    }
}
