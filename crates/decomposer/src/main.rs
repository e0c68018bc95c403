//! Decomposition driver
//!
//! Usage: `decompose <config.json> [ranks]`
//!
//! Runs the decomposition on a local group of rank threads and logs the
//! resulting boxes and counts.

use decomposer::{comm::run_local_group, decompose, DecompositionConfig, DecompositionError};

fn parse_ranks(arg: Option<String>) -> Result<usize, DecompositionError> {
    match arg {
        None => Ok(1),
        Some(text) => match text.parse::<usize>() {
            Ok(ranks) if ranks > 0 => Ok(ranks),
            _ => Err(DecompositionError::Config(format!(
                "rank count must be a positive integer, got {:?}",
                text
            ))),
        },
    }
}

fn run(config_path: &str, ranks: usize) -> Result<(), DecompositionError> {
    let config = DecompositionConfig::load(config_path)?;
    tracing::info!("Loaded {} for {} rank(s)", config_path, ranks);

    let results = run_local_group(ranks, |comm| decompose(comm, &config));
    let mut states = Vec::with_capacity(ranks);
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(state) => states.push(state),
            Err(e) => errors.push(e),
        }
    }
    // the failing rank's own error beats the other ranks' aborts
    if let Some(pos) = errors
        .iter()
        .position(|e| !matches!(e, DecompositionError::Aborted(_)))
    {
        return Err(errors.swap_remove(pos));
    }
    if let Some(e) = errors.pop() {
        return Err(e);
    }

    let Some(first) = states.first() else {
        return Ok(());
    };
    tracing::info!(
        "Axis priority {:?}, partitions {:?}",
        first.table.plan.axis_priority,
        first.table.plan.grid()
    );
    for state in &states {
        match state.local_baryon_count() {
            Some(baryons) => tracing::info!(
                "rank {:>4}: {:>12} particles, {:>10} baryons, box {:?}",
                state.rank,
                state.local_count(),
                baryons,
                state.local_box().bounds
            ),
            None => tracing::info!(
                "rank {:>4}: {:>12} particles, box {:?}",
                state.rank,
                state.local_count(),
                state.local_box().bounds
            ),
        }
    }
    tracing::info!("Total: {} particles", first.counts.total());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decomposer=info".into()),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: decompose <config.json> [ranks]");
        std::process::exit(2);
    };

    let outcome = parse_ranks(args.next()).and_then(|ranks| run(&config_path, ranks));
    if let Err(e) = outcome {
        tracing::error!("Decomposition failed: {}", e);
        std::process::exit(1);
    }
}
