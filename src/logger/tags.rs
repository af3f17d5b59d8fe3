/// Log tags, one per pipeline subsystem

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Decision,
    Risk,
    MarketData,
    Quote,
    Network,
    Executor,
    Tracker,
    Reconcile,
    Other(String),
}

impl LogTag {
    /// Key used by `--debug-<key>` flags and `logging.debug_tags`
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Decision => "decision".to_string(),
            LogTag::Risk => "risk".to_string(),
            LogTag::MarketData => "marketdata".to_string(),
            LogTag::Quote => "quote".to_string(),
            LogTag::Network => "network".to_string(),
            LogTag::Executor => "executor".to_string(),
            LogTag::Tracker => "tracker".to_string(),
            LogTag::Reconcile => "reconcile".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Uncolored label written to the log file
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::System => "SYSTEM".to_string(),
            LogTag::Config => "CONFIG".to_string(),
            LogTag::Decision => "DECISION".to_string(),
            LogTag::Risk => "RISK".to_string(),
            LogTag::MarketData => "MARKET".to_string(),
            LogTag::Quote => "QUOTE".to_string(),
            LogTag::Network => "NETWORK".to_string(),
            LogTag::Executor => "EXECUTOR".to_string(),
            LogTag::Tracker => "TRACKER".to_string(),
            LogTag::Reconcile => "RECONCILE".to_string(),
            LogTag::Other(s) => s.to_uppercase(),
        }
    }

    /// Every named tag, used to expand `--debug-all`
    pub fn all() -> [LogTag; 10] {
        [
            LogTag::System,
            LogTag::Config,
            LogTag::Decision,
            LogTag::Risk,
            LogTag::MarketData,
            LogTag::Quote,
            LogTag::Network,
            LogTag::Executor,
            LogTag::Tracker,
            LogTag::Reconcile,
        ]
    }
}
