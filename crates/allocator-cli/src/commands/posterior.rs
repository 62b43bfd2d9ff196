use clap::Args;
use serde_json::Value;

use allocator_core::black_litterman::{self, PosteriorInput};
use allocator_core::config::AllocatorConfig;

use crate::input;

#[derive(Args)]
pub struct PosteriorArgs {
    /// Path to a JSON file with `moments` and `views` or `view_specification`
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_posterior(
    args: PosteriorArgs,
    config: Option<&AllocatorConfig>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut bl_input: PosteriorInput =
        input::read_input(args.input.as_deref(), "the Black-Litterman posterior")?;
    if let Some(cfg) = config {
        bl_input.config = cfg.black_litterman.clone();
    }
    let result = black_litterman::run_posterior(&bl_input)?;
    Ok(serde_json::to_value(result)?)
}
