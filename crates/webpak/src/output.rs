//! Terminal output utilities

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use webpak_archive::TreeStats;
use webpak_core::byte_to_human_readable;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Print the counters of a packed or unpacked tree
pub fn tree_stats(key: &str, stats: &TreeStats) {
    let mut summary = format!(
        "{} files, {} directories, {}",
        stats.files,
        stats.directories,
        byte_to_human_readable(stats.bytes)
    );
    if stats.symlinks > 0 {
        summary.push_str(&format!(", {} symlinks", stats.symlinks));
    }
    if stats.skipped > 0 {
        summary.push_str(&format!(", {} skipped", stats.skipped));
    }
    kv(key, &summary);
}

/// Create a spinner
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
