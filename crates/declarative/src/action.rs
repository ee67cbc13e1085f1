//! Applying a single action against the host
//!
//! Every action first works out whether the host already matches, so
//! re-applying a converged action is a no-op. In a dry run the check is all
//! that happens.

use std::collections::BTreeMap;

use crate::context::ApplyContext;
use crate::error::{ActionError, Error};
use crate::facts::HostFacts;
use crate::rule::{Action, CommandSpec, ServiceState, resolve_vars};
use crate::types::EvaluateOptions;

/// Result of one applied action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub changed: bool,
    pub detail: Option<String>,
}

impl Applied {
    fn unchanged(detail: Option<String>) -> Self {
        Self {
            changed: false,
            detail,
        }
    }

    fn changed(detail: Option<String>) -> Self {
        Self {
            changed: true,
            detail,
        }
    }
}

/// Apply (or, in a dry run, check) an action
pub fn apply(
    action: &Action,
    facts: &HostFacts,
    ctx: &ApplyContext<'_>,
    opts: &EvaluateOptions,
) -> Result<Applied, Error> {
    let dry_run = opts.dry_run;
    match action {
        Action::Service { name, states } => apply_service(name, states, ctx, dry_run),
        Action::Template {
            path,
            template,
            context,
        } => {
            let vars = resolve_vars(context, facts, opts.strict)?;
            let rendered = ctx.templates.render(template, &vars)?;
            let current = ctx.files.read(path)?;
            if current.as_deref() == Some(rendered.as_slice()) {
                return Ok(Applied::unchanged(Some(path.clone())));
            }
            if !dry_run {
                ctx.files.write_atomic(path, &rendered)?;
            }
            Ok(Applied::changed(Some(path.clone())))
        }
        Action::Uninstall {
            command,
            unless,
            vars,
        } => {
            let vars = resolve_vars(vars, facts, opts.strict)?;
            let (program, args) = command.interpolate(&vars)?;
            let detail = Some(command_line(&program, &args));

            if let Some(guard) = unless
                && guard_passes(guard, &vars, ctx)?
            {
                return Ok(Applied::unchanged(detail));
            }
            if dry_run {
                return Ok(Applied::changed(detail));
            }

            let output = ctx.commands.run(&program, &args)?;
            if !output.success() {
                let code = output
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                return Err(ActionError::process(format!(
                    "{program} exited with {code}: {}",
                    output.stderr_str().trim()
                ))
                .into());
            }
            Ok(Applied::changed(detail))
        }
        Action::GroupMembers {
            group,
            members,
            append,
        } => {
            let current = ctx.groups.members(group)?;
            let desired: Vec<String> = if *append {
                let mut all = current.clone();
                for m in members {
                    if !all.contains(m) {
                        all.push(m.clone());
                    }
                }
                all
            } else {
                members.clone()
            };

            let same =
                desired.len() == current.len() && desired.iter().all(|m| current.contains(m));
            let detail = Some(format!("{group}: {}", desired.join(",")));
            if same {
                return Ok(Applied::unchanged(detail));
            }
            if !dry_run {
                ctx.groups.set_members(group, &desired)?;
            }
            Ok(Applied::changed(detail))
        }
    }
}

/// Drive a service through `states`. Shared with the restart flush.
pub fn apply_service(
    name: &str,
    states: &[ServiceState],
    ctx: &ApplyContext<'_>,
    dry_run: bool,
) -> Result<Applied, Error> {
    if states.is_empty() {
        return Ok(Applied::unchanged(None));
    }
    let changed = if dry_run {
        ctx.services.check(name, states)?
    } else {
        ctx.services.set_state(name, states)?
    };
    Ok(Applied {
        changed,
        detail: None,
    })
}

fn guard_passes(
    guard: &CommandSpec,
    vars: &BTreeMap<String, String>,
    ctx: &ApplyContext<'_>,
) -> Result<bool, Error> {
    let (program, args) = guard.interpolate(vars)?;
    let output = ctx.commands.run(&program, &args)?;
    log::debug!(
        "guard {} exited with {:?}",
        command_line(&program, &args),
        output.exit_code
    );
    Ok(output.success())
}

fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
