//! Log formatting and output with ANSI colors
//!
//! Console lines are colored and aligned; file lines are plain with a full
//! timestamp. Broken pipes (e.g. `swapguard ... | head`) end the process quietly.

use super::config::get_logger_config;
use super::file::write_to_file;
use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stderr, ErrorKind, Write};

/// Log format widths for alignment
const TAG_WIDTH: usize = 10;
const LEVEL_WIDTH: usize = 7;

pub fn format_and_log(tag: &LogTag, level: LogLevel, message: &str) {
    let now = Local::now();

    if get_logger_config().console {
        let line = format!(
            "{} [{}] [{}] {}",
            now.format("%H:%M:%S").to_string().dimmed(),
            format_tag(tag),
            format_level(level),
            message
        );
        print_stderr_safe(&line);
    }

    write_to_file(&format!(
        "{} [{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        tag.to_plain_string(),
        level.as_str(),
        message
    ));
}

/// Format a tag with appropriate color
fn format_tag(tag: &LogTag) -> ColoredString {
    let label = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::System => label.bright_yellow().bold(),
        LogTag::Config => label.bright_white().bold(),
        LogTag::Decision => label.bright_blue().bold(),
        LogTag::Risk => label.bright_red().bold(),
        LogTag::MarketData => label.bright_cyan().bold(),
        LogTag::Quote => label.cyan().bold(),
        LogTag::Network => label.bright_purple().bold(),
        LogTag::Executor => label.bright_green().bold(),
        LogTag::Tracker => label.bright_magenta().bold(),
        LogTag::Reconcile => label.yellow().bold(),
        LogTag::Other(_) => label.white().bold(),
    }
}

fn format_level(level: LogLevel) -> ColoredString {
    let label = format!("{:<width$}", level.as_str(), width = LEVEL_WIDTH);
    match level {
        LogLevel::Error => label.bright_red().bold(),
        LogLevel::Warning => label.bright_yellow().bold(),
        LogLevel::Info => label.white().bold(),
        LogLevel::Debug => label.bright_black(),
        LogLevel::Verbose => label.dimmed(),
    }
}

/// Logs go to stderr so `process` can print its JSON outcome on stdout
fn print_stderr_safe(message: &str) {
    if let Err(e) = writeln!(stderr(), "{}", message) {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
    }
}
