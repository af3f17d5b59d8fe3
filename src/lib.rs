//! swapguard: decision-to-execution pipeline for aggregator swaps on Solana
//!
//! Recommendation text flows through validation, the risk gate, quote
//! resolution, network health checks and execution; every trade is tracked in
//! a journaled lifecycle.

pub mod arguments;
pub mod config;
pub mod decision;
pub mod errors;
pub mod executor;
pub mod logger;
pub mod marketdata;
pub mod network;
pub mod pipeline;
pub mod quotes;
pub mod reconcile;
pub mod risk;
pub mod tracker;
pub mod utils;
pub mod venue;

#[doc(hidden)]
pub mod testing;
