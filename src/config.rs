use anyhow::{Context, Result, bail};
use declarative::{Rule, RuleSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;
use crate::recipes;

/// Environment variable naming the cookbook file
pub const ENV_COOKBOOK: &str = "WATCHPOST_COOKBOOK";

const COOKBOOK_STEM: &str = "cookbook";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => bail!(
                "Unsupported cookbook format: {} (expected .toml or .json)",
                path.display()
            ),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(self, content: &str) -> Result<T> {
        match self {
            Self::Toml => toml::from_str(content).context("Invalid TOML"),
            Self::Json => serde_json::from_str(content).context("Invalid JSON"),
        }
    }
}

/// A named rule list loaded from disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cookbook {
    #[serde(default = "default_name")]
    pub name: String,

    /// Treat a missing fact as an error instead of `false`
    #[serde(default)]
    pub strict: bool,

    /// Directory whose files override the built-in templates
    #[serde(default)]
    pub templates_dir: Option<String>,

    /// Kill external commands that run longer than this
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    /// Built-in recipes whose rules run before `rules`
    #[serde(default)]
    pub recipes: Vec<String>,

    #[serde(default)]
    pub rules: Vec<Rule>,

    /// File this cookbook was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_name() -> String {
    "default".to_string()
}

impl Cookbook {
    pub fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mut cookbook: Self = format
            .parse(&content)
            .with_context(|| format!("Invalid cookbook {}", path.display()))?;
        cookbook.source = Some(path.to_path_buf());
        log::debug!(
            "Loaded cookbook '{}' from {} ({} rules)",
            cookbook.name,
            path.display(),
            cookbook.rules.len()
        );
        Ok(cookbook)
    }

    /// First of `cookbook.toml` / `cookbook.json` that exists in the config dir
    pub fn default_path() -> Result<Option<PathBuf>> {
        let dir = paths::config_dir()?;
        Ok(find_in(&dir))
    }

    /// Load the cookbook for a run.
    ///
    /// An explicit path wins. Without one the default location is used if it
    /// exists; with neither, `recipes` alone must name something to run.
    pub fn resolve(explicit: Option<&Path>, recipes: &[String]) -> Result<Self> {
        let mut cookbook = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_path()? {
                Some(path) => Self::load(&path)?,
                None if !recipes.is_empty() => Self {
                    name: recipes.join("+"),
                    ..Self::default()
                },
                None => bail!(
                    "No cookbook found in {}; pass --cookbook or --recipe",
                    paths::config_dir()?.display()
                ),
            },
        };
        for recipe in recipes {
            if !cookbook.recipes.contains(recipe) {
                cookbook.recipes.push(recipe.clone());
            }
        }
        Ok(cookbook)
    }

    /// Recipe rules followed by the cookbook's own, validated
    pub fn rule_set(&self) -> Result<RuleSet> {
        let mut rules = recipes::rules_for(&self.recipes)?;
        rules.extend(self.rules.iter().cloned());
        RuleSet::new(rules).with_context(|| format!("Cookbook '{}' is invalid", self.name))
    }

    /// Template override directory; relative paths are taken from the
    /// cookbook's own directory
    pub fn templates_path(&self) -> Option<PathBuf> {
        let dir = paths::expand(self.templates_dir.as_deref()?);
        if dir.is_relative()
            && let Some(parent) = self.source.as_deref().and_then(Path::parent)
        {
            return Some(parent.join(dir));
        }
        Some(dir)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    [ConfigFormat::Toml, ConfigFormat::Json]
        .into_iter()
        .map(|f| dir.join(format!("{COOKBOOK_STEM}.{}", f.extension())))
        .find(|p| p.exists())
}
