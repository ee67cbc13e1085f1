//! Command implementations

pub mod apply;
pub mod facts;
pub mod plan;
pub mod recipes;
pub mod validate;

use anyhow::{Result, bail};
use declarative::{
    EvaluateOptions, EvaluationResult, HostFacts, NoProgress, ProgressCallback, RuleSet, Summary,
};
use std::path::Path;
use std::time::Duration;

use crate::Context;
use crate::cli::{RunArgs, SourceArgs};
use crate::config::Cookbook;
use crate::facts::SystemFacts;
use crate::host::{Host, TemplateLibrary};
use crate::progress::TerminalProgress;
use crate::runner::ProcessRunner;

/// A cookbook and its validated rules
pub struct Loaded {
    pub cookbook: Cookbook,
    pub rules: RuleSet,
}

/// Outcome of one pass, possibly cut short by a critical rule
pub struct Pass {
    pub result: EvaluationResult,
    pub halted: Option<String>,
}

impl Pass {
    /// Fail the command when the pass halted or any rule failed
    pub fn check(&self) -> Result<()> {
        check(&self.result.summary(), self.halted.as_deref())
    }
}

pub fn load(source: &SourceArgs) -> Result<Loaded> {
    let cookbook = Cookbook::resolve(source.cookbook.as_deref(), &source.recipes)?;
    let rules = cookbook.rule_set()?;
    log::info!("Cookbook '{}': {} rules", cookbook.name, rules.len());
    Ok(Loaded { cookbook, rules })
}

pub fn fact_source(facts_file: Option<&Path>) -> Result<SystemFacts> {
    match facts_file {
        Some(path) => Ok(SystemFacts::with_overrides(SystemFacts::load_overrides(path)?)),
        None => Ok(SystemFacts::new()),
    }
}

impl Loaded {
    /// Snapshot every fact the rules read
    pub fn gather(&self, args: &RunArgs) -> Result<HostFacts> {
        let source = fact_source(args.facts.as_deref())?;
        let facts = HostFacts::collect(&source, self.rules.fact_keys());
        log::debug!("Gathered {} facts", facts.len());
        Ok(facts)
    }

    pub fn host(&self, args: &RunArgs) -> Host {
        let timeout = args
            .timeout
            .map(Duration::from_secs)
            .or_else(|| self.cookbook.command_timeout());
        Host::new(
            TemplateLibrary::new(self.cookbook.templates_path()),
            ProcessRunner::new(timeout),
        )
    }

    pub fn options(&self, args: &RunArgs, dry_run: bool) -> EvaluateOptions {
        EvaluateOptions {
            dry_run,
            strict: args.strict || self.cookbook.strict,
        }
    }

    pub fn evaluate<P: ProgressCallback>(
        &self,
        facts: &HostFacts,
        host: &Host,
        opts: &EvaluateOptions,
        progress: &mut P,
    ) -> Pass {
        match declarative::evaluate(facts, &self.rules, &host.context(), opts, progress) {
            Ok(result) => Pass {
                result,
                halted: None,
            },
            Err(e) => {
                log::error!("{e}");
                Pass {
                    result: e.partial().clone(),
                    halted: Some(e.to_string()),
                }
            }
        }
    }

    /// Evaluate with per-rule lines unless output is quiet or JSON
    pub fn evaluate_with_output(
        &self,
        ctx: &Context,
        facts: &HostFacts,
        host: &Host,
        opts: &EvaluateOptions,
        json: bool,
    ) -> Pass {
        if json || ctx.quiet {
            self.evaluate(facts, host, opts, &mut NoProgress)
        } else {
            let mut progress = TerminalProgress::new(opts.dry_run, ctx.verbose > 0);
            self.evaluate(facts, host, opts, &mut progress)
        }
    }
}

fn check(summary: &Summary, halted: Option<&str>) -> Result<()> {
    if let Some(reason) = halted {
        bail!("Pass halted: {reason}");
    }
    if summary.failed > 0 {
        bail!("{} rule(s) failed", summary.failed);
    }
    Ok(())
}
