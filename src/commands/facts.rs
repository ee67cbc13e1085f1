use anyhow::Result;
use declarative::HostFacts;
use std::collections::BTreeSet;

use crate::cli::FactsArgs;
use crate::facts::{STATIC_KEYS, SystemFacts};
use crate::ui;

pub fn run(args: FactsArgs) -> Result<()> {
    let overrides = match &args.facts {
        Some(path) => SystemFacts::load_overrides(path)?,
        None => HostFacts::default(),
    };

    let mut keys: BTreeSet<String> = STATIC_KEYS.iter().map(|k| (*k).to_string()).collect();
    keys.extend(overrides.iter().map(|(k, _)| k.to_string()));
    keys.extend(args.keys.iter().cloned());
    if !args.source.is_empty() {
        let loaded = super::load(&args.source)?;
        keys.extend(loaded.rules.fact_keys().into_iter().map(str::to_string));
    }

    let source = SystemFacts::with_overrides(overrides);
    let facts = HostFacts::collect(&source, keys.iter().map(String::as_str));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&facts)?);
        return Ok(());
    }

    ui::header("Host facts");
    for (key, value) in facts.iter() {
        ui::kv(key, &value.to_string());
    }
    for key in keys.iter().filter(|k| !facts.contains(k)) {
        ui::dim(&format!("{key}: (absent)"));
    }
    Ok(())
}
