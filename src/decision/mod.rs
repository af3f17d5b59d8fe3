//! Decision validation
//!
//! Turns the free-form recommendation text produced by the language model into
//! a schema-checked [`TradeDecision`]. Pure functions, no I/O.

mod parser;
mod schema;

pub use parser::{
    extract_json_object, fingerprint, hold_on_failure, normalize_pair, validate, validate_or_hold,
    DEFAULT_HOLD_CONFIDENCE, REASONING_MAX_CHARS, REASONING_MIN_CHARS,
};
pub use schema::{TradeAction, TradeDecision};
