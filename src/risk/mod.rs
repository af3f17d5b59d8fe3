//! Risk gate: position-size, confidence and daily-loss limits

mod advisory;
mod gate;

pub use advisory::ParameterSuggestion;
pub use gate::{authorize, Authorization, PortfolioState, RiskLimits};
