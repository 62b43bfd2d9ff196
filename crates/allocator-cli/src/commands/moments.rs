use clap::Args;
use serde_json::Value;

use allocator_core::moments::{self, MomentsInput};

use crate::input;

#[derive(Args)]
pub struct MomentsArgs {
    /// Path to a JSON file with `returns` and optional `annualization_factor`
    #[arg(long)]
    pub input: Option<String>,

    /// Periods per year; overrides the value in the input file
    #[arg(long)]
    pub annualize: Option<rust_decimal::Decimal>,
}

pub fn run_moments(args: MomentsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut moments_input: MomentsInput =
        input::read_input(args.input.as_deref(), "moment estimation")?;
    if args.annualize.is_some() {
        moments_input.annualization_factor = args.annualize;
    }
    let result = moments::run_moments(&moments_input)?;
    Ok(serde_json::to_value(result)?)
}
