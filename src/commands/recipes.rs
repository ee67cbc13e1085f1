use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

use crate::cli::RecipesArgs;
use crate::host::TemplateLibrary;
use crate::recipes::{self, RECIPES, Recipe};
use crate::ui;

pub fn run(args: RecipesArgs) -> Result<()> {
    match args.name {
        Some(name) => {
            let recipe =
                recipes::find(&name).with_context(|| format!("Unknown recipe '{name}'"))?;
            show(recipe, args.json)
        }
        None => list(args.json),
    }
}

fn list(json: bool) -> Result<()> {
    if json {
        let recipes: Vec<_> = RECIPES
            .iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "description": r.description,
                    "rules": r.rules().len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    ui::header("Built-in recipes");
    for recipe in RECIPES {
        println!(
            "  {} {}",
            recipe.name.bold(),
            format!("({} rules)", recipe.rules().len()).dimmed()
        );
        ui::dim(recipe.description);
    }

    ui::section("Built-in templates");
    for name in TemplateLibrary::builtin_names() {
        ui::dim(name);
    }
    Ok(())
}

fn show(recipe: &Recipe, json: bool) -> Result<()> {
    let rules = recipe.rules();
    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    ui::header(recipe.name);
    ui::dim(recipe.description);
    for rule in &rules {
        ui::section(&rule.id);
        ui::kv("action", &rule.action.description());
        ui::kv("when", &serde_json::to_string(&rule.when)?);
        if let Some(target) = &rule.notifies {
            ui::kv("notifies", target);
        }
        if rule.critical {
            ui::kv("critical", "yes");
        }
    }
    Ok(())
}
