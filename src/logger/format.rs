//! Log formatting and output with ANSI colors
//!
//! Handles colorized console output with aligned tag/level columns, plus an
//! optional file sink for daemon runs. Console writes tolerate broken pipes
//! so piped commands can exit early without panicking the process.

use super::tags::LogTag;
use chrono::Local;
use colored::*;
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::{stdout, ErrorKind, Write};
use std::path::Path;
use std::sync::Mutex;

const TAG_WIDTH: usize = 9;
const LEVEL_WIDTH: usize = 7;

static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

/// Open the log file sink. Failures are reported on stderr and logging
/// continues console-only.
pub fn init_file_logging(path: &str) {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(dir);
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            if let Ok(mut guard) = LOG_FILE.lock() {
                *guard = Some(file);
            }
        }
        Err(e) => {
            eprintln!("lanescout: could not open log file {}: {}", path, e);
        }
    }
}

/// Flush pending file writes (called on shutdown)
pub fn flush_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = file.flush();
        }
    }
}

/// Format and emit one log line to console and file
pub fn format_and_log(tag: LogTag, level: &str, message: &str) {
    let now = Local::now();
    let time = now.format("%H:%M:%S").to_string();

    let tag_str = format_tag(&tag);
    let level_str = format_level(level);

    let console_line = format!(
        "{} [{}] [{}] {}",
        time.dimmed(),
        tag_str,
        level_str,
        message
    );
    print_stdout_safe(&console_line);

    let file_line = format!(
        "{} [{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        tag.as_str(),
        level,
        message
    );
    write_to_file(&file_line);
}

fn format_tag(tag: &LogTag) -> ColoredString {
    let padded = format!("{:<width$}", tag.as_str(), width = TAG_WIDTH);
    match tag {
        LogTag::System => padded.bright_yellow().bold(),
        LogTag::Config => padded.bright_white().bold(),
        LogTag::Api => padded.bright_cyan().bold(),
        LogTag::Collector => padded.bright_green().bold(),
        LogTag::Cache => padded.bright_blue().bold(),
        LogTag::Backfill => padded.bright_magenta().bold(),
        LogTag::Scheduler => padded.bright_red().bold(),
    }
}

fn format_level(level: &str) -> ColoredString {
    let padded = format!("{:<width$}", level, width = LEVEL_WIDTH);
    match level {
        "ERROR" => padded.bright_red().bold(),
        "WARNING" => padded.bright_yellow(),
        "INFO" => padded.normal(),
        "DEBUG" => padded.bright_black(),
        _ => padded.dimmed(),
    }
}

fn write_to_file(line: &str) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Print to stdout, ignoring broken pipes (e.g. `lanescout overview | head`)
fn print_stdout_safe(line: &str) {
    let mut out = stdout();
    if let Err(e) = writeln!(out, "{}", line) {
        if e.kind() != ErrorKind::BrokenPipe {
            eprintln!("{}", line);
        }
    }
}
