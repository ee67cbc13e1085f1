use colored::{ColoredString, Colorize};
use declarative::{Outcome, Summary};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Outcomes
// ============================================================================

pub fn outcome_symbol(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::Skipped => "⊘".dimmed(),
        Outcome::NoOp => "○".dimmed(),
        Outcome::Changed => "✓".green(),
        Outcome::Failed { .. } => "✗".red(),
    }
}

/// Outcome label; in a dry run a change has not happened yet
pub fn outcome_label(outcome: &Outcome, dry_run: bool) -> ColoredString {
    match outcome {
        Outcome::Changed if dry_run => "would change".yellow(),
        Outcome::Changed => "changed".green(),
        Outcome::Failed { reason } => reason.as_str().red(),
        other => other.label().dimmed(),
    }
}

/// Print final summary
pub fn summary(summary: &Summary, dry_run: bool) {
    println!();
    if !summary.is_success() {
        println!("  {} Converged with errors", "⚠".yellow().bold());
    } else if summary.total_changes() == 0 {
        println!("  {} Host already converged", "✓".green().bold());
    } else if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else {
        println!("  {} Host converged", "✓".green().bold());
    }

    let changed = if dry_run { "to change" } else { "changed" };
    let restarted = if dry_run { "to restart" } else { "restarted" };
    for (count, label) in [
        (summary.changed, format!("rules {changed}")),
        (summary.restarted, format!("services {restarted}")),
        (summary.no_op, "rules already converged".to_string()),
        (summary.skipped, "rules skipped".to_string()),
    ] {
        if count > 0 {
            println!("    • {count} {label}");
        }
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}

/// Truncate a string for display, keeping the end
pub fn truncate_start(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = text.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}
