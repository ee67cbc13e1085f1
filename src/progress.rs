//! Live per-rule output while a pass runs

use colored::Colorize;
use declarative::{NotificationOutcome, Outcome, ProgressCallback, RuleOutcome};

use crate::ui;

const DESCRIPTION_WIDTH: usize = 48;

/// Prints one line per rule as it completes
pub struct TerminalProgress {
    dry_run: bool,
    /// Also print skipped rules
    show_skipped: bool,
}

impl TerminalProgress {
    pub fn new(dry_run: bool, show_skipped: bool) -> Self {
        Self {
            dry_run,
            show_skipped,
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_rule_start(&mut self, id: &str, description: &str) {
        log::debug!("Evaluating {id}: {description}");
    }

    fn on_rule_complete(&mut self, outcome: &RuleOutcome) {
        if outcome.outcome == Outcome::Skipped && !self.show_skipped {
            return;
        }
        println!(
            "  {} {:<24} {:<width$} {}",
            ui::outcome_symbol(&outcome.outcome),
            outcome.rule_id,
            ui::truncate_start(&outcome.description, DESCRIPTION_WIDTH).dimmed(),
            ui::outcome_label(&outcome.outcome, self.dry_run),
            width = DESCRIPTION_WIDTH,
        );
    }

    fn on_notification(&mut self, outcome: &NotificationOutcome) {
        println!(
            "  {} {:<24} {:<width$} {}",
            ui::outcome_symbol(&outcome.outcome),
            format!("restart {}", outcome.service),
            format!("requested by {}", outcome.requested_by.join(", ")).dimmed(),
            ui::outcome_label(&outcome.outcome, self.dry_run),
            width = DESCRIPTION_WIDTH,
        );
    }
}
