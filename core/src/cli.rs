use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::interpreter::{check_script, Session};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence - loop execution runtime for statistical scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script
    Run {
        /// Script file to execute
        script: String,

        /// Safety ceiling for while loops (overrides config)
        #[arg(long)]
        max_while_iterations: Option<usize>,

        /// Seed for random draws (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the final workspace as JSON
        #[arg(long)]
        dump_json: bool,
    },

    /// Compile every loop in a script without running it
    Check {
        /// Script file to check
        script: String,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Run {
            script,
            max_while_iterations,
            seed,
            dump_json,
        } => {
            let config = Config::builder()
                .config_path(config_path)
                .max_while_iterations(max_while_iterations)
                .random_seed(seed)
                .build()?;
            init_tracing(&config.logging.level);

            let source = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("Failed to read {}", script))?;

            // Ctrl-C stops the script at the next poll point
            let token = CancellationToken::new();
            let watcher = {
                let token = token.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        token.cancel();
                    }
                })
            };

            let session_token = token.clone();
            let (result, workspace) = tokio::task::spawn_blocking(move || {
                let mut session = Session::builder().config(config).cancel_with(session_token).build();
                let result = session.run_script(&source);
                let workspace = dump_json.then(|| session.workspace().to_json());
                (result, workspace)
            })
            .await
            .context("Script task panicked")?;
            watcher.abort();

            result.with_context(|| format!("{} failed", script))?;
            if let Some(json) = workspace {
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            info!(script = %script, "script finished");
        }

        Commands::Check { script } => {
            let config = Config::builder().config_path(config_path).build()?;
            init_tracing(&config.logging.level);

            let source = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("Failed to read {}", script))?;
            let loops = check_script(&source).with_context(|| format!("{} failed to compile", script))?;
            println!("✓ {}: {} loop(s) compiled", script, loops);
        }

        Commands::Config => {
            let config = Config::builder().config_path(config_path).build()?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Log to stderr so script output on stdout stays clean
fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::parse_from(["cadence", "--config", "c.toml", "run", "s.inp", "--seed", "7", "--dump-json"]);
        assert_eq!(cli.config.as_deref(), Some("c.toml"));
        match cli.command {
            Commands::Run {
                script, seed, dump_json, max_while_iterations,
            } => {
                assert_eq!(script, "s.inp");
                assert_eq!(seed, Some(7));
                assert!(dump_json);
                assert_eq!(max_while_iterations, None);
            }
            _ => panic!("expected run"),
        }
    }
}
