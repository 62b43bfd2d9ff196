use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use allocator_core::config::AllocatorConfig;
use allocator_core::portfolio_optimization::mean_variance::{self, MeanVarianceInput};

use crate::input;

#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to a JSON file with `posterior` and optional `current_weights`
    #[arg(long)]
    pub input: Option<String>,

    /// Risk aversion (lambda); overrides the configured value
    #[arg(long)]
    pub risk_aversion: Option<Decimal>,

    /// Proportional transaction cost rate; overrides the configured value
    #[arg(long)]
    pub tc_rate: Option<Decimal>,
}

pub fn run_optimize(
    args: OptimizeArgs,
    config: Option<&AllocatorConfig>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut mv_input: MeanVarianceInput =
        input::read_input(args.input.as_deref(), "mean-variance optimization")?;
    if let Some(cfg) = config {
        mv_input.config = cfg.optimizer.clone();
    }
    if let Some(lambda) = args.risk_aversion {
        mv_input.config.risk_aversion = lambda;
    }
    if let Some(tc) = args.tc_rate {
        mv_input.config.transaction_cost_rate = tc;
    }
    let result = mean_variance::run_optimize(&mv_input)?;
    Ok(serde_json::to_value(result)?)
}
