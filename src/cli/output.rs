//! Output formatting infrastructure for CLI commands.

use async_trait::async_trait;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::models::ConflictSeverity;
use crate::services::{ProgressObserver, ProgressUpdate, QualityCheckpoint, SessionControl};

/// Output mode for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

/// Print a single item as pretty-printed JSON.
pub fn output_json<T: Serialize>(item: &T) {
    match serde_json::to_string_pretty(item) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize to JSON: {}", e)),
    }
}

/// Print a formatted table with headers and rows.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("{}", "No results found.".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers);

    for row in rows {
        table.add_row(row);
    }

    println!("{table}");
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "OK".green().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

/// Print a warning to stderr.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), msg);
}

/// Print a bold section header.
pub fn print_header(title: &str) {
    println!("\n{}\n", title.bold());
}

/// Print a key-value pair line.
pub fn print_kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a dimmed hint/suggestion message.
pub fn print_hint(msg: &str) {
    println!("{}", msg.dimmed());
}

/// Colored severity tag for tables.
pub fn severity_cell(severity: ConflictSeverity) -> String {
    match severity {
        ConflictSeverity::None => "-".dimmed().to_string(),
        ConflictSeverity::Low => "low".to_string(),
        ConflictSeverity::Medium => "medium".yellow().to_string(),
        ConflictSeverity::High => "high".red().bold().to_string(),
    }
}

pub fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

/// Spinner for steps without a known length.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Progress bar fed by the batch processor.
///
/// With `pause` set, a quality checkpoint waits for Enter on stdin before
/// the session resumes.
pub struct BarObserver {
    bar: ProgressBar,
    control: SessionControl,
    pause: bool,
}

impl BarObserver {
    pub fn new(total: u64, control: SessionControl, pause: bool) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self {
            bar,
            control,
            pause,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[async_trait]
impl ProgressObserver for BarObserver {
    async fn on_progress(&self, update: &ProgressUpdate) {
        self.bar.set_length(update.total_count as u64);
        self.bar.set_position(update.settled() as u64);
        if update.failed_count > 0 {
            self.bar.set_message(format!("{} failed", update.failed_count));
        }
    }

    async fn on_checkpoint(&self, checkpoint: &QualityCheckpoint) {
        let msg = format!(
            "failure rate {} exceeds {} after {} comments",
            percent(checkpoint.failure_rate),
            percent(checkpoint.threshold),
            checkpoint.settled_count
        );
        if !self.pause {
            self.bar.println(format!("{} {}", "Checkpoint:".yellow().bold(), msg));
            return;
        }

        self.bar.println(format!(
            "{} {} (press Enter to continue, Ctrl-C to stop)",
            "Checkpoint:".yellow().bold(),
            msg
        ));
        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| ())
        })
        .await;
        match read {
            Ok(Ok(())) => self.control.acknowledge_checkpoint(),
            _ => self.control.cancel(),
        }
    }
}
