// src/utils/format.rs

//! Display formats shared by scoring, results and the quiz listing.

use chrono::Duration;

/// `HH:MM:SS:mmmm`, milliseconds zero-padded to four digits.
/// Negative durations render as zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.num_milliseconds().max(0);

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;

    format!("{:02}:{:02}:{:02}:{:04}", hours, minutes, seconds, millis)
}

/// `HH:MM:SS` for a whole number of seconds.
pub fn format_clock(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total_seconds / 3_600,
        (total_seconds / 60) % 60,
        total_seconds % 60
    )
}

/// Renders a fraction in [0, 1] as a percentage with two decimals.
pub fn format_percentage(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}
