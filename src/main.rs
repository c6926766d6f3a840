use std::error::Error;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use embedding_tuner::{Config, Pipeline};

/// Tunes word2vec hyper parameters against a set of word analogies.
#[derive(Parser, Debug)]
#[command(name = "embedding_tuner", version, about)]
struct Args {
    /// Path to the json config
    config: String,

    /// Overrides n_trials from the config
    #[arg(long)]
    n_trials: Option<usize>,

    /// Overrides timeout_secs from the config
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// One of trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn main() -> Result<(), Box<dyn Error>> {

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("building parameters...");
    let mut config = Config::new(&args.config).map_err(|e| {
        error!("could not build parameters from {}: {}", args.config, e);
        e
    })?;
    if let Some(n_trials) = args.n_trials {
        config.n_trials = n_trials;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    config.validate()?;

    let report = Pipeline::run(&config).map_err(|e| {
        error!("{}", e);
        e
    })?;

    println!("{}", report);
    println!("outputs saved to {}", config.output_dir);
    Ok(())
}
