pub mod posterior;
pub mod views;

pub use posterior::{
    compute_posterior, compute_posterior_with_config, run_posterior, PosteriorEstimate,
    PosteriorInput, PosteriorOutput, ReturnComparison,
};
pub use views::{proportional_omega, OmegaMethod, View, ViewSpecification, ViewType};
