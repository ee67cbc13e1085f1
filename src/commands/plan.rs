use anyhow::Result;
use colored::Colorize;
use declarative::rule::resolve_vars;
use declarative::{Action, EvaluationResult, FileStore, HostFacts, Rule, TemplateRenderer};
use similar::{ChangeTag, TextDiff};

use super::Loaded;
use crate::Context;
use crate::cli::RunArgs;
use crate::host::Host;
use crate::report::Report;
use crate::ui;

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let loaded = super::load(&args.source)?;
    let facts = loaded.gather(&args)?;
    let host = loaded.host(&args);
    let opts = loaded.options(&args, true);

    if !args.json {
        ui::header(&format!("Plan: {}", loaded.cookbook.name));
    }
    let pass = loaded.evaluate_with_output(ctx, &facts, &host, &opts, args.json);

    if args.json {
        let report =
            Report::new(&loaded.cookbook.name, &facts, &pass.result).halted(pass.halted.clone());
        println!("{}", report.to_json()?);
        return pass.check();
    }

    show_template_diffs(&loaded, &pass.result, &facts, &host, opts.strict);
    if let Some(reason) = &pass.halted {
        ui::error(reason);
    }
    ui::summary(&pass.result.summary(), true);
    pass.check()
}

/// Unified diff of every template render that would change a file
fn show_template_diffs(
    loaded: &Loaded,
    result: &EvaluationResult,
    facts: &HostFacts,
    host: &Host,
    strict: bool,
) {
    for outcome in &result.applied {
        if !outcome.outcome.is_change() {
            continue;
        }
        let rule = loaded.rules.get(&outcome.rule_id);
        let Some((path, old, new)) = rule.and_then(|r| pending_render(r, facts, host, strict))
        else {
            continue;
        };
        ui::section(&path);
        print_diff(&old, &new);
    }
}

fn pending_render(
    rule: &Rule,
    facts: &HostFacts,
    host: &Host,
    strict: bool,
) -> Option<(String, String, String)> {
    let Action::Template {
        path,
        template,
        context,
    } = &rule.action
    else {
        return None;
    };
    let vars = resolve_vars(context, facts, strict).ok()?;
    let rendered = host.templates.render(template, &vars).ok()?;
    let current = host.files.read(path).ok()?.unwrap_or_default();
    Some((
        path.clone(),
        String::from_utf8_lossy(&current).into_owned(),
        String::from_utf8_lossy(&rendered).into_owned(),
    ))
}

fn print_diff(old: &str, new: &str) {
    let diff = TextDiff::from_lines(old, new);
    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("- {change}").red(),
            ChangeTag::Insert => format!("+ {change}").green(),
            ChangeTag::Equal => continue,
        };
        print!("    {line}");
        if change.missing_newline() {
            println!();
        }
    }
}
