use hitscan_core::config::{BreakpointSettings, HitscanConfig};
use hitscan_core::executor::{PersistentConfig, ProcessController};
use hitscan_core::oracle::ScoreOracle;
use hitscan_core::search::{SearchEngine, SearchOutcome};
use hitscan_core::sim::{self, SimDebugger};

use clap::Parser;
use std::path::PathBuf;

/// Score-guided key reconstruction against a simulated round-based
/// target. Real debugger backends plug in through the
/// `hitscan_core::Debugger` trait; this binary demonstrates the search
/// against the built-in simulator.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Secret the simulated target compares its input against
    #[clap(long)]
    secret: String,
    #[clap(long)]
    known_prefix: Option<String>,
    #[clap(long)]
    known_suffix: Option<String>,
    #[clap(long)]
    chunk_size: Option<usize>,
    #[clap(long)]
    charset: Option<String>,
    /// Reuse one checkpointed process per trial instead of respawning
    #[clap(long)]
    persistent: bool,
    /// Print the final outcome as JSON
    #[clap(long)]
    json: bool,
}

fn banner() {
    println!("+--------------------------------------------+");
    println!("| hitscan - hit-count guided key bruteforcer |");
    println!("+--------------------------------------------+");
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    banner();

    let mut config = match cli.config_file {
        Some(config_path) => {
            println!("Loading configuration from specified path: {config_path:?}");
            HitscanConfig::load_from_file(&config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("hitscan.toml");
            if default_config_path.exists() {
                println!(
                    "No config file specified via CLI, loading default: {default_config_path:?}",
                );
                HitscanConfig::load_from_file(&default_config_path)?
            } else {
                HitscanConfig::default()
            }
        }
    };

    if let Some(prefix) = cli.known_prefix {
        config.search.known_prefix = prefix;
    }
    if let Some(suffix) = cli.known_suffix {
        config.search.known_suffix = suffix;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.search.chunk_size = chunk_size;
    }
    if let Some(charset) = cli.charset {
        config.search.charset = charset;
    }

    let persistent = cli.persistent || config.persistent.is_some();

    let mut debugger = if persistent {
        SimDebugger::looping(cli.secret.as_bytes())
    } else {
        SimDebugger::new(cli.secret.as_bytes())
    };

    // with no operator addresses, instrument the simulator's own
    // comparison and win locations
    let breakpoints = if config.breakpoints.positive.is_none()
        && config.breakpoints.negative.is_none()
        && config.breakpoints.win.is_none()
        && config.breakpoints.lose.is_none()
    {
        BreakpointSettings {
            positive: Some(sim::POSITIVE_ADDR),
            win: Some(sim::WIN_ADDR),
            ..Default::default()
        }
    } else {
        config.breakpoints.clone()
    };

    let oracle = ScoreOracle::install(&mut debugger, &breakpoints)?;

    let controller = if persistent {
        let persistent_config = match &config.persistent {
            Some(settings) => PersistentConfig {
                start_addr: settings.start,
                end_addr: settings.end,
                buffer_addr: settings.buffer,
                checkpoint_ceiling: settings.checkpoint_ceiling,
            },
            None => PersistentConfig::new(sim::START_ADDR, sim::END_ADDR, sim::BUFFER_ADDR),
        };
        ProcessController::persistent(debugger, oracle, persistent_config)?
    } else {
        ProcessController::fresh(debugger, oracle)
    };

    let mut engine = SearchEngine::new(controller, &config.search)?;
    let outcome = engine.bruteforce()?;

    if cli.json {
        println!("{}", outcome.to_json()?);
    } else {
        match &outcome {
            SearchOutcome::Complete { key, .. } => {
                println!("Reconstructed key: '{key}'");
            }
            SearchOutcome::Exhausted { .. } => {
                println!("Best-effort reconstruction: '{outcome}'");
            }
        }
    }

    Ok(())
}
