use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cella_app::{WorkerEvent, WorkerHandle, WorkerSettings};
use cella_core::{CellaConfig, EvaluationMode, Grid};
use clap::Parser;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    name = "cella",
    version,
    about = "Run a toroidal cellular automaton headlessly and log each generation"
)]
struct Cli {
    /// JSON config file; flags below override its fields.
    #[arg(long, env = "CELLA_CONFIG")]
    config: Option<PathBuf>,
    /// Grid dimension (cells per side).
    #[arg(long, env = "CELLA_SIZE")]
    size: Option<usize>,
    /// Highest color a cell may hold (1-8).
    #[arg(long)]
    max_color: Option<u8>,
    /// Rule code, highest priority first. Repeat for more rules.
    #[arg(long = "rule", value_name = "CODE")]
    rules: Vec<String>,
    /// Seed for the initial grid and the random action.
    #[arg(long, env = "CELLA_SEED")]
    seed: Option<u64>,
    /// Fraction of cells filled in the initial grid.
    #[arg(long)]
    density: Option<f32>,
    /// Re-evaluate every cell each generation instead of only changed areas.
    #[arg(long)]
    exhaustive: bool,
    /// Number of generations to run.
    #[arg(long, default_value_t = 100)]
    generations: u64,
    /// Step one generation at a time, feeding each result back in.
    #[arg(long)]
    single: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let grid = config.seeded_grid().context("failed to seed initial grid")?;
    info!(
        size = config.grid_size,
        max_color = config.max_color,
        rules = ?config.rules,
        live = grid.live_count(),
        "starting simulation"
    );

    let mut worker = WorkerHandle::spawn(WorkerSettings::from_config(&config))
        .context("failed to start simulation worker")?;
    worker
        .init(grid.clone(), &config.rules, config.max_color)
        .context("failed to initialise engine")?;

    let last = if cli.single {
        run_single(&worker, grid, cli.generations)?
    } else {
        run_loop(&worker, grid, cli.generations)?
    };
    worker.shutdown();

    let population = last.population();
    info!(
        live = last.live_count(),
        population = ?&population[..=usize::from(config.max_color)],
        "simulation finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(cli: &Cli) -> Result<CellaConfig> {
    let mut config = match &cli.config {
        Some(path) => CellaConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CellaConfig::default(),
    };
    if let Some(size) = cli.size {
        config.grid_size = size;
    }
    if let Some(max_color) = cli.max_color {
        config.max_color = max_color;
    }
    if !cli.rules.is_empty() {
        config.rules = cli.rules.clone();
    }
    if cli.seed.is_some() {
        config.rng_seed = cli.seed;
    }
    if let Some(density) = cli.density {
        config.seed_density = density;
    }
    if cli.exhaustive {
        config.evaluation = EvaluationMode::Exhaustive;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Drive the worker with one `Start` per generation.
fn run_single(worker: &WorkerHandle, mut grid: Grid, generations: u64) -> Result<Grid> {
    for _ in 0..generations {
        worker.start(grid)?;
        let (generation, next) = next_update(worker)?;
        log_generation(generation, &next);
        grid = next;
    }
    Ok(grid)
}

/// Let the worker loop, then stop it once enough generations have arrived.
fn run_loop(worker: &WorkerHandle, grid: Grid, generations: u64) -> Result<Grid> {
    let mut last = grid.clone();
    if generations == 0 {
        return Ok(last);
    }
    worker.run_loop(grid)?;
    loop {
        let (generation, next) = next_update(worker)?;
        log_generation(generation, &next);
        last = next;
        if generation >= generations {
            break;
        }
    }
    worker.stop()?;
    // Steps already in flight when the stop landed still report.
    loop {
        match worker.recv_event() {
            Some(WorkerEvent::Update { generation, .. }) => {
                debug!(generation, "discarding update after stop request");
            }
            Some(WorkerEvent::Stopped { generation }) => {
                info!(generation, "worker stopped");
                return Ok(last);
            }
            Some(WorkerEvent::Fault(message)) => bail!("simulation worker failed: {message}"),
            None => bail!("simulation worker exited before acknowledging stop"),
        }
    }
}

fn next_update(worker: &WorkerHandle) -> Result<(u64, Grid)> {
    loop {
        match worker.recv_event() {
            Some(WorkerEvent::Update { generation, grid }) => return Ok((generation, grid)),
            Some(WorkerEvent::Stopped { .. }) => continue,
            Some(WorkerEvent::Fault(message)) => bail!("simulation worker failed: {message}"),
            None => bail!("simulation worker exited unexpectedly"),
        }
    }
}

fn log_generation(generation: u64, grid: &Grid) {
    info!(generation, live = grid.live_count(), "generation");
}
