use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{EvaluationResult, NoProgress};
use dialoguer::Confirm;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::report::Report;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let ApplyArgs { run: args, yes } = args;
    if args.json && !yes {
        bail!("--json cannot prompt for confirmation; pass --yes as well");
    }

    let loaded = super::load(&args.source)?;
    let facts = loaded.gather(&args)?;
    let host = loaded.host(&args);

    if !args.json {
        ui::header(&format!("Apply: {}", loaded.cookbook.name));
    }

    if !yes {
        let preview = loaded.evaluate(&facts, &host, &loaded.options(&args, true), &mut NoProgress);
        let summary = preview.result.summary();
        if summary.total_changes() == 0 && summary.is_success() && preview.halted.is_none() {
            ui::success("Host already converged");
            return Ok(());
        }

        show_pending(&preview.result);
        if !confirm_proceed(summary.total_changes())? {
            ui::info("Aborted. No changes made.");
            return Ok(());
        }
        println!();
    }

    let opts = loaded.options(&args, false);
    let pass = loaded.evaluate_with_output(ctx, &facts, &host, &opts, args.json);

    if args.json {
        let report = Report::new(&loaded.cookbook.name, &facts, &pass.result)
            .halted(pass.halted.clone())
            .with_file_hashes(&loaded.rules, &host.files);
        println!("{}", report.to_json()?);
        return pass.check();
    }

    if let Some(reason) = &pass.halted {
        ui::error(reason);
    }
    ui::summary(&pass.result.summary(), false);
    pass.check()
}

fn show_pending(preview: &EvaluationResult) {
    for rule in preview.applied.iter().filter(|r| r.outcome.is_change()) {
        println!("  {} {} {}", "~".yellow(), rule.rule_id, rule.description.dimmed());
    }
    for restart in preview.notifications.iter().filter(|n| n.outcome.is_change()) {
        println!("  {} restart {}", "↻".yellow(), restart.service);
    }
    let failing = preview.applied.iter().filter(|r| !r.outcome.is_success());
    for rule in failing {
        println!("  {} {} {}", "✗".red(), rule.rule_id, rule.outcome.to_string().dimmed());
    }
    println!();
}

/// Confirm with user
fn confirm_proceed(changes: usize) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(format!("Apply {changes} change(s)?"))
        .default(true)
        .interact()?;

    Ok(confirmed)
}
