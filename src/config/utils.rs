/// Configuration utilities - loading, validation and saving
use super::schemas::Config;
use crate::errors::ConfigError;
use crate::logger::{self, LogTag};
use std::path::Path;

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/swapguard.toml";

/// Load and validate configuration from a TOML file
///
/// A missing file is not an error: defaults are used and a warning is logged.
pub fn load_config_from_path(path: &str) -> Result<Config, ConfigError> {
    let config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        parse_config(path, &contents)?
    } else {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path),
        );
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

/// Parse configuration text; `origin` is only used in error messages
pub fn parse_config(origin: &str, contents: &str) -> Result<Config, ConfigError> {
    toml::from_str::<Config>(contents).map_err(|e| ConfigError::Parse {
        path: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Write the configuration as pretty TOML
pub fn save_config(config: &Config, path: &str) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, text).map_err(|e| ConfigError::Io {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl Config {
    /// Reject values that would disable a safety check or make no sense
    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;
        if !(risk.max_trade_size_usd > 0.0) {
            return Err(invalid("risk.max_trade_size_usd", "must be > 0"));
        }
        if !(risk.max_daily_loss_usd > 0.0) {
            return Err(invalid("risk.max_daily_loss_usd", "must be > 0"));
        }
        if risk.max_open_positions == 0 {
            return Err(invalid("risk.max_open_positions", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&risk.min_confidence) {
            return Err(invalid("risk.min_confidence", "must be within [0, 1]"));
        }
        if risk.available_capital_usd < 0.0 || !risk.available_capital_usd.is_finite() {
            return Err(invalid("risk.available_capital_usd", "must be a finite value >= 0"));
        }

        if !(self.quotes.min_liquidity_usd > 0.0) {
            return Err(invalid("quotes.min_liquidity_usd", "must be > 0"));
        }
        if self.quotes.slippage_bps == 0 || self.quotes.slippage_bps > 10_000 {
            return Err(invalid("quotes.slippage_bps", "must be within 1..=10000"));
        }
        if self.quotes.freshness_secs == 0 {
            return Err(invalid("quotes.freshness_secs", "must be >= 1"));
        }

        if self.network.fee_ceiling_lamports == 0 {
            return Err(invalid("network.fee_ceiling_lamports", "must be > 0"));
        }
        if self.marketdata.request_timeout_ms == 0 || self.network.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "timeouts must be > 0"));
        }
        if self.marketdata.retry_attempts == 0 {
            return Err(invalid("marketdata.retry_attempts", "must be >= 1"));
        }

        match self.execution.venue.as_str() {
            "jupiter" | "paper" => {}
            other => {
                return Err(invalid(
                    "execution.venue",
                    format!("unknown venue '{}' (expected jupiter or paper)", other),
                ))
            }
        }
        if self.execution.confirmation_timeout_secs == 0 {
            return Err(invalid("execution.confirmation_timeout_secs", "must be >= 1"));
        }
        if self.execution.confirmation_poll_ms == 0 {
            return Err(invalid("execution.confirmation_poll_ms", "must be > 0"));
        }

        Ok(())
    }
}
