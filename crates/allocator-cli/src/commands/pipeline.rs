use clap::Args;
use serde_json::Value;

use allocator_core::config::AllocatorConfig;
use allocator_core::pipeline::{self, AllocationInput};

use crate::input;

#[derive(Args)]
pub struct PipelineArgs {
    /// Path to a JSON file with `returns`, views and optional `current_weights`
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_pipeline(
    args: PipelineArgs,
    config: Option<&AllocatorConfig>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut alloc_input: AllocationInput =
        input::read_input(args.input.as_deref(), "the allocation pipeline")?;
    if let Some(cfg) = config {
        alloc_input.config = cfg.clone();
    }
    let result = pipeline::run_allocation(&alloc_input)?;
    Ok(serde_json::to_value(result)?)
}
