//! Structured, tagged logging for the swap pipeline
//!
//! ```rust
//! use swapguard::logger::{self, LogTag};
//!
//! logger::info(LogTag::Executor, "Swap confirmed");
//! logger::debug(LogTag::MarketData, "Cache miss for quote"); // only with --debug-marketdata
//! ```
//!
//! Call [`init`] once at startup; without it everything at Info and above
//! goes to stderr, which is what tests get.

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

pub use config::{
    config_from_args, get_logger_config, set_logger_config, update_logger_config, LoggerConfig,
};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Install the logger configuration and open the log file
pub fn init(config: LoggerConfig) {
    set_logger_config(config);
    file::init_file_logging();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (only when debug is enabled for the tag)
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (only with --verbose)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush pending file writes; call during shutdown
pub fn flush() {
    file::flush_file_logging();
}
