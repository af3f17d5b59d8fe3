/// Runtime logger configuration
///
/// Held behind a process-wide RwLock so the binary can set it once from
/// command-line flags and the `[logging]` config section.
use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    /// Tags with debug output enabled (by debug key)
    pub debug_tags: HashSet<String>,
    /// When non-empty, only these tags are printed (errors always pass)
    pub enabled_tags: HashSet<String>,
    pub file_path: Option<String>,
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
            file_path: None,
            console: true,
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

pub fn update_logger_config<F: FnOnce(&mut LoggerConfig)>(f: F) {
    let mut config = LOGGER_CONFIG.write();
    f(&mut config);
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read();
    config.min_level >= LogLevel::Debug || config.debug_tags.contains(&tag.to_debug_key())
}

/// Build a logger config from `--debug-<tag>`, `--debug-all` and `--verbose` flags
pub fn config_from_args(args: &[String]) -> LoggerConfig {
    let mut config = LoggerConfig::default();
    for arg in args {
        if arg == "--verbose" {
            config.min_level = LogLevel::Verbose;
        } else if arg == "--debug-all" {
            config
                .debug_tags
                .extend(LogTag::all().iter().map(|t| t.to_debug_key()));
        } else if let Some(key) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(key.to_lowercase());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_args() {
        let args = vec![
            "swapguard".to_string(),
            "--debug-marketdata".to_string(),
            "--debug-Executor".to_string(),
        ];
        let config = config_from_args(&args);
        assert!(config.debug_tags.contains("marketdata"));
        assert!(config.debug_tags.contains("executor"));
        assert_eq!(config.min_level, LogLevel::Info);

        let verbose = config_from_args(&["--verbose".to_string(), "--debug-all".to_string()]);
        assert_eq!(verbose.min_level, LogLevel::Verbose);
        assert_eq!(verbose.debug_tags.len(), LogTag::all().len());
    }
}
