//! greenproof daemon — prints configuration and replays command scripts.

mod script;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use greenproof_node::{init_logging, LogFormat, NodeConfig};

#[derive(Parser)]
#[command(name = "greenproof-daemon", about = "greenproof attestation engine daemon")]
struct Cli {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Overrides the config file.
    #[arg(long, env = "GREENPROOF_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json". Overrides the config file.
    #[arg(long, env = "GREENPROOF_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print the default configuration as TOML.
    Defaults,

    /// Replay a JSON command script against a fresh in-memory engine and
    /// print one JSON result per step.
    Replay {
        /// TOML configuration file; defaults apply when omitted.
        #[arg(long, env = "GREENPROOF_CONFIG")]
        config: Option<PathBuf>,

        /// JSON script: an array of steps.
        #[arg(long)]
        script: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Defaults => {
            print!("{}", NodeConfig::default().to_toml_string()?);
        }
        Command::Replay { config, script } => {
            let config = match config {
                Some(path) => NodeConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => NodeConfig::default(),
            };
            init_logging(
                cli.log_format.unwrap_or(config.log_format),
                cli.log_level.as_deref().unwrap_or(&config.log_level),
            )?;

            let contents = std::fs::read_to_string(&script)
                .with_context(|| format!("reading script {}", script.display()))?;
            let steps = script::parse(&contents)
                .with_context(|| format!("parsing script {}", script.display()))?;
            tracing::info!(steps = steps.len(), script = %script.display(), "replaying script");

            let replay = script::Replay::new(&config.engine)?;
            let results = replay.run(&steps);
            let failed = results.iter().filter(|r| r.error.is_some()).count();
            for result in &results {
                println!("{}", serde_json::to_string(result)?);
            }
            tracing::info!(steps = results.len(), failed, "replay finished");
        }
    }

    Ok(())
}
