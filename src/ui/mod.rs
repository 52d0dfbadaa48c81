//! CLI output helpers: status icons, colored lines and number formatting.

use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::models::{ClusterFailureKind, RunReport};

/// Check if stdout is a terminal.
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Status icons for summary lines.
pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
        Status::Pending => "○",
    }
}

/// Status types for colored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
    Pending,
}

/// Print a styled status message.
pub fn print_status(status: Status, msg: &str) {
    let icon = status_icon(status);
    match status {
        Status::Success => println!("{} {}", icon.green().bold(), msg),
        Status::Error => println!("{} {}", icon.red().bold(), msg),
        Status::Warning => println!("{} {}", icon.yellow().bold(), msg),
        Status::Info => println!("{} {}", icon.cyan().bold(), msg),
        Status::Pending => println!("{} {}", icon.white().dimmed(), msg),
    }
}

/// Status lines for the noteworthy parts of a run report.
pub fn print_report_notes(report: &RunReport) {
    for block in &report.blocks_skipped {
        print_status(
            Status::Warning,
            &format!(
                "Block '{}' skipped ({} records over the size ceiling)",
                block.key,
                format_number(block.size)
            ),
        );
    }
    for conflict in &report.identifier_conflicts {
        let outcome = match &conflict.chosen {
            Some(id) => format!("kept {}", id),
            None => "held for review".to_string(),
        };
        print_status(
            Status::Warning,
            &format!(
                "Conflicting identifiers {} in [{}], {}",
                conflict.identifiers.join(", "),
                conflict.members.join(", "),
                outcome
            ),
        );
    }
    for failure in &report.failures {
        let reason = match &failure.failure {
            ClusterFailureKind::RaceRetriesExhausted { attempts } => {
                format!("identifier race persisted after {} attempts", attempts)
            }
            ClusterFailureKind::Persistence { message } => message.clone(),
        };
        print_status(
            Status::Error,
            &format!("Cluster [{}] not linked: {}", failure.members.join(", "), reason),
        );
    }

    if report.has_failures() {
        print_status(Status::Error, "Run finished with failures; rerun to retry them");
    } else {
        print_status(
            Status::Success,
            &format!(
                "Linked {} records into {} clusters",
                format_number(report.records_linked),
                format_number(report.linked.len())
            ),
        );
    }
}

/// Format a number with commas.
pub fn format_number(n: usize) -> String {
    n.to_string()
        .chars()
        .rev()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect()
}

/// Format a `[0, 1]` score for display.
pub fn format_score(score: f64) -> String {
    format!("{:.3}", score)
}

/// Truncate text to at most `max_chars` characters, ending in "..." when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if max_chars <= 3 {
        return "...".to_string();
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_icon() {
        assert_eq!(status_icon(Status::Success), "✓");
        assert_eq!(status_icon(Status::Error), "✗");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("Hello", 10), "Hello");
        assert_eq!(truncate_with_ellipsis("Hello World", 8), "Hello...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
        assert_eq!(truncate_with_ellipsis("Hello", 3), "...");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1000000), "1,000,000");
        assert_eq!(format_number(123), "123");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0.70049), "0.700");
        assert_eq!(format_score(1.0), "1.000");
    }
}
