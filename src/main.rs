use anyhow::{Context, Result};
use std::io::Read;
use swapguard::arguments::{self, Command};
use swapguard::config::{load_config_from_path, LoggingConfig};
use swapguard::logger::{self, LogLevel, LogTag, LoggerConfig};
use swapguard::pipeline::Pipeline;

/// Fold the `[logging]` section into the flags given on the command line
fn logger_config(mut from_flags: LoggerConfig, section: &LoggingConfig) -> LoggerConfig {
    from_flags
        .debug_tags
        .extend(section.debug_tags.iter().map(|t| t.to_lowercase()));
    if section.verbose && from_flags.min_level < LogLevel::Verbose {
        from_flags.min_level = LogLevel::Verbose;
    }
    if !section.file_path.is_empty() {
        from_flags.file_path = Some(section.file_path.clone());
    }
    from_flags
}

fn read_decision(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read recommendation from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("failed to read recommendation from '{}'", source))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (cli, flags) = match arguments::parse_from(std::env::args().collect()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    // Flags alone until the config file is read, so config errors are visible
    logger::set_logger_config(flags.clone());
    let config = load_config_from_path(&cli.config)
        .with_context(|| format!("invalid configuration '{}'", cli.config))?;
    logger::init(logger_config(flags, &config.logging));

    logger::info(
        LogTag::System,
        &format!("swapguard {} starting ({})", env!("CARGO_PKG_VERSION"), cli.config),
    );

    let pipeline = Pipeline::from_config(config).context("failed to start pipeline")?;

    let result = match cli.command {
        Command::Process { decision_file } => match read_decision(&decision_file) {
            Ok(text) => {
                let outcome = pipeline.process(&text, None).await;
                serde_json::to_string_pretty(&outcome)
                    .map(|json| println!("{}", json))
                    .context("failed to serialize outcome")
            }
            Err(e) => Err(e),
        },
        Command::Reconcile => {
            let report = pipeline.reconciler().run_once().await;
            serde_json::to_string_pretty(&report)
                .map(|json| println!("{}", json))
                .context("failed to serialize reconciliation report")
        }
    };

    pipeline.shutdown();
    result
}
