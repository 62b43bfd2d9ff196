pub mod moments;
pub mod optimize;
pub mod pipeline;
pub mod posterior;
pub mod risk_parity;
pub mod simulate;
