//! Configuration system
//!
//! Sections are declared with [`config_struct!`](crate::config_struct) and
//! loaded from TOML. The loaded [`Config`] is handed to the pipeline context;
//! there is no global config instance.

mod macros;
mod schemas;
mod utils;

pub use schemas::{
    Config, ExecutionConfig, JournalConfig, LoggingConfig, MarketDataConfig, NetworkConfig,
    QuotesConfig, RiskConfig,
};
pub use utils::{load_config_from_path, parse_config, save_config, CONFIG_FILE_PATH};
