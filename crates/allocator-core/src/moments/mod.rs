pub mod returns_matrix;
pub mod shrinkage;

pub use returns_matrix::{ReturnObservation, ReturnsMatrix};
pub use shrinkage::{estimate_moments, run_moments, MomentEstimate, MomentsInput};
