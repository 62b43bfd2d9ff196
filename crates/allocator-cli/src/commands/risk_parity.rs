use clap::Args;
use serde_json::Value;

use allocator_core::config::AllocatorConfig;
use allocator_core::portfolio_optimization::risk_parity::{self, RiskParityInput};

use crate::input;

#[derive(Args)]
pub struct RiskParityArgs {
    /// Path to a JSON file with `covariance` and optional `assets`
    #[arg(long)]
    pub input: Option<String>,

    /// Fail instead of returning best-effort weights when the iteration cap is hit
    #[arg(long)]
    pub strict: bool,
}

pub fn run_risk_parity(
    args: RiskParityArgs,
    config: Option<&AllocatorConfig>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut rp_input: RiskParityInput =
        input::read_input(args.input.as_deref(), "risk parity")?;
    if let Some(cfg) = config {
        rp_input.config = cfg.risk_parity.clone();
    }
    let result = risk_parity::run_risk_parity(&rp_input)?;
    if args.strict {
        result.result.solution.clone().require_converged()?;
    }
    Ok(serde_json::to_value(result)?)
}
