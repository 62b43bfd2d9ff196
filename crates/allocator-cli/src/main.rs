mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::moments::MomentsArgs;
use commands::optimize::OptimizeArgs;
use commands::pipeline::PipelineArgs;
use commands::posterior::PosteriorArgs;
use commands::risk_parity::RiskParityArgs;
use commands::simulate::SimulateArgs;

/// Black-Litterman allocation, risk parity and rebalancing simulation
#[derive(Parser)]
#[command(
    name = "allocator",
    version,
    about = "Black-Litterman allocation, risk parity and rebalancing simulation",
    long_about = "A CLI for portfolio allocation with decimal precision. Estimates \
                  shrunk moments from return histories, blends them with investor \
                  views, solves turnover-aware mean-variance and risk-parity \
                  portfolios, and replays rebalancing policies against return paths."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Solver and simulator settings (.json, .yaml or .yml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log solver progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate mean returns and a Ledoit-Wolf shrunk covariance
    Moments(MomentsArgs),
    /// Combine prior moments with investor views (Black-Litterman)
    Posterior(PosteriorArgs),
    /// Mean-variance weights with an L1 transaction-cost penalty
    Optimize(OptimizeArgs),
    /// Equal-risk-contribution weights
    RiskParity(RiskParityArgs),
    /// Run one rebalancing episode with a scripted policy
    Simulate(SimulateArgs),
    /// Returns -> moments -> posterior -> mean-variance and risk parity
    Pipeline(PipelineArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("allocator_core=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // stdout carries the result document; logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.config.as_deref().map(input::config::load_config).transpose() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Moments(args) => commands::moments::run_moments(args),
        Commands::Posterior(args) => commands::posterior::run_posterior(args, config.as_ref()),
        Commands::Optimize(args) => commands::optimize::run_optimize(args, config.as_ref()),
        Commands::RiskParity(args) => commands::risk_parity::run_risk_parity(args, config.as_ref()),
        Commands::Simulate(args) => commands::simulate::run_simulate(args, config.as_ref()),
        Commands::Pipeline(args) => commands::pipeline::run_pipeline(args, config.as_ref()),
        Commands::Version => {
            println!("allocator {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
