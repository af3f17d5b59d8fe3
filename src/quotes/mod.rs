/// Quote resolution: liquidity gate, normalization and freshness
pub mod resolver;
pub mod types;

pub use resolver::QuoteResolver;
pub use types::{bps_to_fraction, Quote};
