// src/utils/log.rs

//! Console report helpers with server-style formatting.
//!
//! Used by the CLI for human-facing output. Visibility follows the active
//! `log` filter, so `--verbose` and `RUST_LOG` apply here too.

use chrono::Local;

fn enabled() -> bool {
    ::log::log_enabled!(::log::Level::Info)
}

/// Format a line with timestamp and tag
fn format_line(tag: &str, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, tag, message)
}

/// Log a success message (always shown)
pub fn success(message: &str) {
    println!("{}", format_line("INFO", &format!("✓ {}", message)));
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    if enabled() {
        let msg = format!("[STEP {}/{}] {}", step_num, total, message);
        println!("{}", format_line("INFO", &msg));
    }
}

/// Log a header
pub fn header(title: &str) {
    if enabled() {
        let border = "═".repeat(60);
        println!("{}", border);
        println!("  {}", title);
        println!("{}", border);
    }
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    if enabled() {
        println!("    {}", message);
    }
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    if enabled() {
        println!();
        println!("{}", format_line("SUMMARY", title));
        for (key, value) in items {
            println!("    {}: {}", key, value);
        }
    }
}
