use anyhow::{Result, bail};
use declarative::{Action, RuleSet};

use crate::cli::SourceArgs;
use crate::host::TemplateLibrary;
use crate::ui;

pub fn run(args: SourceArgs) -> Result<()> {
    let loaded = super::load(&args)?;
    let cookbook = &loaded.cookbook;

    ui::header(&format!("Cookbook: {}", cookbook.name));
    if let Some(source) = &cookbook.source {
        ui::kv("file", &source.display().to_string());
    }
    let recipes = if cookbook.recipes.is_empty() {
        "none".to_string()
    } else {
        cookbook.recipes.join(", ")
    };
    ui::kv("recipes", &recipes);
    ui::kv("rules", &loaded.rules.len().to_string());
    ui::kv("strict", if cookbook.strict { "yes" } else { "no" });
    if loaded.rules.is_empty() {
        ui::warn("Cookbook has no rules");
    }

    let keys = loaded.rules.fact_keys();
    if !keys.is_empty() {
        ui::section("Facts read");
        for key in keys {
            ui::dim(key);
        }
    }

    let templates = TemplateLibrary::new(cookbook.templates_path());
    let problems = missing_templates(&loaded.rules, &templates);
    println!();
    if problems.is_empty() {
        ui::success("Cookbook is valid");
        return Ok(());
    }
    for problem in &problems {
        ui::error(problem);
    }
    bail!("{} problem(s) found", problems.len())
}

/// Template rules whose template cannot be found
fn missing_templates(rules: &RuleSet, templates: &TemplateLibrary) -> Vec<String> {
    rules
        .rules()
        .iter()
        .filter_map(|rule| match &rule.action {
            Action::Template { template, .. } => templates
                .source(template)
                .err()
                .map(|e| format!("{}: {e}", rule.id)),
            _ => None,
        })
        .collect()
}
