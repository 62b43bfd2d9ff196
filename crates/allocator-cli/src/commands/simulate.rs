use clap::Args;
use serde_json::Value;

use allocator_core::config::AllocatorConfig;
use allocator_core::simulation::{self, SimulationInput};

use crate::input;

#[derive(Args)]
pub struct SimulateArgs {
    /// Path to a JSON file with `returns`, `policy` and optional `prediction`
    #[arg(long)]
    pub input: Option<String>,

    /// Drop the per-step reward and value series from the output
    #[arg(long)]
    pub summary_only: bool,
}

pub fn run_simulate(
    args: SimulateArgs,
    config: Option<&AllocatorConfig>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sim_input: SimulationInput =
        input::read_input(args.input.as_deref(), "the rebalancing simulation")?;
    if let Some(cfg) = config {
        sim_input.config = cfg.simulator.clone();
    }
    let mut result = simulation::run_simulation(&sim_input)?;
    if args.summary_only {
        result.result.rewards.clear();
        result.result.values.clear();
    }
    Ok(serde_json::to_value(result)?)
}
