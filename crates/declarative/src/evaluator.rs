//! Convergence evaluator - applies a rule set against one fact snapshot
//!
//! Rules run strictly in declared order, one at a time. Restart requests
//! from changed rules are queued and flushed once, after every rule has run.

use crate::action::{self, Applied};
use crate::context::{ApplyContext, NoProgress, ProgressCallback};
use crate::error::{Error, EvaluateError};
use crate::facts::HostFacts;
use crate::queue::NotificationQueue;
use crate::rule::{Action, Rule, RuleSet, ServiceState};
use crate::types::{EvaluateOptions, EvaluationResult, NotificationOutcome, Outcome, RuleOutcome};

/// Evaluate every rule against `facts` and flush queued restarts
///
/// Non-critical failures are recorded and evaluation continues. A failing
/// critical rule halts the pass; the error carries everything recorded so
/// far. The fact snapshot is only ever read.
pub fn evaluate<P: ProgressCallback>(
    facts: &HostFacts,
    rules: &RuleSet,
    ctx: &ApplyContext<'_>,
    opts: &EvaluateOptions,
    progress: &mut P,
) -> Result<EvaluationResult, EvaluateError> {
    let mut result = EvaluationResult {
        dry_run: opts.dry_run,
        ..Default::default()
    };
    let mut queue = NotificationQueue::new();

    for rule in rules.rules() {
        progress.on_rule_start(&rule.id, &rule.action.description());

        let outcome = evaluate_rule(rule, facts, ctx, opts);
        let (outcome, detail, error) = match outcome {
            Ok(None) => (Outcome::Skipped, None, None),
            Ok(Some(applied)) if applied.changed => (Outcome::Changed, applied.detail, None),
            Ok(Some(applied)) => (Outcome::NoOp, applied.detail, None),
            Err(e) => (
                Outcome::Failed {
                    reason: e.to_string(),
                },
                None,
                Some(e),
            ),
        };

        match &outcome {
            Outcome::Skipped => log::debug!("{}: skipped", rule.id),
            Outcome::NoOp => log::debug!("{}: already converged", rule.id),
            Outcome::Changed => log::info!("{}: {}", rule.id, rule.action.description()),
            Outcome::Failed { reason } => log::warn!("{}: {reason}", rule.id),
        }

        if outcome.is_change() {
            if is_restart(&rule.action)
                && let Some(service) = rule.action.service_name()
            {
                queue.mark_restarted(service);
            }
            if let Some(target) = rule.notifies.as_deref().and_then(|t| rules.get(t))
                && let Some(service) = target.action.service_name()
                && queue.enqueue(service, &rule.id)
            {
                log::debug!("{}: queued restart of {service}", rule.id);
            }
        }

        let record = RuleOutcome {
            rule_id: rule.id.clone(),
            kind: rule.action.kind().to_string(),
            description: rule.action.description(),
            outcome,
            detail,
        };
        progress.on_rule_complete(&record);
        result.applied.push(record);

        if let Some(source) = error
            && rule.critical
        {
            return Err(EvaluateError::CriticalFailure {
                rule_id: rule.id.clone(),
                source,
                partial: Box::new(result),
            });
        }
    }

    flush(queue, rules, ctx, opts, &mut result, progress)?;

    Ok(result)
}

/// Evaluate without progress reporting
pub fn evaluate_simple(
    facts: &HostFacts,
    rules: &RuleSet,
    ctx: &ApplyContext<'_>,
    opts: &EvaluateOptions,
) -> Result<EvaluationResult, EvaluateError> {
    evaluate(facts, rules, ctx, opts, &mut NoProgress)
}

/// `Ok(None)` when the predicate is false
fn evaluate_rule(
    rule: &Rule,
    facts: &HostFacts,
    ctx: &ApplyContext<'_>,
    opts: &EvaluateOptions,
) -> Result<Option<Applied>, Error> {
    if !rule.when.evaluate(facts, opts.strict)? {
        return Ok(None);
    }
    action::apply(&rule.action, facts, ctx, opts).map(Some)
}

fn is_restart(action: &Action) -> bool {
    matches!(action, Action::Service { states, .. } if states.contains(&ServiceState::Restart))
}

/// Restart every queued service once
fn flush<P: ProgressCallback>(
    queue: NotificationQueue,
    rules: &RuleSet,
    ctx: &ApplyContext<'_>,
    opts: &EvaluateOptions,
    result: &mut EvaluationResult,
    progress: &mut P,
) -> Result<(), EvaluateError> {
    if !queue.is_empty() {
        log::debug!("Flushing {} queued restart(s)", queue.len());
    }
    for (service, requested_by) in queue.drain() {
        let outcome = if opts.dry_run {
            Ok(Outcome::Changed)
        } else {
            action::apply_service(&service, &[ServiceState::Restart], ctx, false).map(|a| {
                if a.changed {
                    Outcome::Changed
                } else {
                    Outcome::NoOp
                }
            })
        };

        let (outcome, error) = match outcome {
            Ok(o) => {
                if opts.dry_run {
                    log::info!("Would restart {service}");
                } else {
                    log::info!("Restarted {service}");
                }
                (o, None)
            }
            Err(e) => {
                log::warn!("Could not restart {service}: {e}");
                (
                    Outcome::Failed {
                        reason: e.to_string(),
                    },
                    Some(e),
                )
            }
        };

        let record = NotificationOutcome {
            service: service.clone(),
            requested_by,
            outcome,
        };
        progress.on_notification(&record);
        result.notifications.push(record);

        // A failed restart of a critical service rule halts like the rule would.
        if let Some(source) = error
            && let Some(rule) = rules
                .rules()
                .iter()
                .find(|r| r.critical && r.action.service_name() == Some(service.as_str()))
        {
            return Err(EvaluateError::CriticalFailure {
                rule_id: rule.id.clone(),
                source,
                partial: Box::new(std::mem::take(result)),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FactValue;
    use crate::predicate::Predicate;
    use crate::rule::{CommandSpec, ValueExpr, Vars};
    use crate::testing::FakeHost;

    fn windows_uninstall_rules() -> RuleSet {
        let windows = Predicate::equals("platform", "windows");
        let mut vars = Vars::new();
        vars.insert(
            "arch".into(),
            ValueExpr::Choose {
                when: Predicate::equals("kernel.machine", "x86_64"),
                then: "x64".into(),
                otherwise: "Win32".into(),
            },
        );
        RuleSet::new(vec![
            Rule::new(
                "stop-nscp",
                windows.clone(),
                Action::Service {
                    name: "nscp".into(),
                    states: vec![ServiceState::Stop, ServiceState::Disable],
                },
            ),
            Rule::new(
                "uninstall-nsclient",
                windows,
                Action::Uninstall {
                    command: CommandSpec::new("uninstall", &["NSClient++ ({{ arch }})"]),
                    unless: Some(CommandSpec::new("absent", &["NSClient++ ({{ arch }})"])),
                    vars,
                },
            ),
        ])
        .unwrap()
    }

    fn datadog_rules() -> RuleSet {
        RuleSet::new(vec![
            Rule::new(
                "nagios-yaml",
                Predicate::truthy("directory:/etc/dd-agent/conf.d"),
                Action::Template {
                    path: "/etc/dd-agent/conf.d/nagios.yaml".into(),
                    template: "nagios.yaml".into(),
                    context: Vars::new(),
                },
            )
            .notifies("datadog-agent"),
            Rule::new(
                "nagios-py",
                Predicate::truthy("directory:/etc/dd-agent/checks.d"),
                Action::Template {
                    path: "/etc/dd-agent/checks.d/nagios.py".into(),
                    template: "nagios.py".into(),
                    context: Vars::new(),
                },
            )
            .notifies("datadog-agent"),
            Rule::new(
                "datadog-agent",
                Predicate::Always,
                Action::Service {
                    name: "datadog-agent".into(),
                    states: vec![],
                },
            ),
        ])
        .unwrap()
    }

    fn datadog_host() -> FakeHost {
        let host = FakeHost::new();
        host.add_template("nagios.yaml", "init_config:\n");
        host.add_template("nagios.py", "class Nagios: pass\n");
        host.add_service("datadog-agent", true, true);
        host
    }

    fn converge(host: &FakeHost, facts: &HostFacts, rules: &RuleSet) -> EvaluationResult {
        evaluate_simple(facts, rules, &host.context(), &EvaluateOptions::default()).unwrap()
    }

    fn dd_facts(conf_d: bool, checks_d: bool) -> HostFacts {
        [
            ("platform", FactValue::from("ubuntu")),
            ("directory:/etc/dd-agent/conf.d", FactValue::from(conf_d)),
            ("directory:/etc/dd-agent/checks.d", FactValue::from(checks_d)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_scenario_windows_x64_stops_then_uninstalls() {
        let host = FakeHost::new();
        host.add_service("nscp", true, true);
        host.install_product("NSClient++ (x64)");
        let facts: HostFacts = [("platform", "windows"), ("kernel.machine", "x86_64")]
            .into_iter()
            .collect();

        let result = converge(&host, &facts, &windows_uninstall_rules());

        assert_eq!(result.outcome("stop-nscp"), Some(&Outcome::Changed));
        assert_eq!(result.outcome("uninstall-nsclient"), Some(&Outcome::Changed));
        assert_eq!(
            host.calls(),
            vec![
                "service nscp stop,disable",
                "run absent NSClient++ (x64)",
                "run uninstall NSClient++ (x64)",
            ]
        );
    }

    #[test]
    fn test_scenario_windows_x86_uses_win32() {
        let host = FakeHost::new();
        host.add_service("nscp", true, true);
        host.install_product("NSClient++ (Win32)");
        let facts: HostFacts = [("platform", "windows"), ("kernel.machine", "i686")]
            .into_iter()
            .collect();

        let result = converge(&host, &facts, &windows_uninstall_rules());

        assert_eq!(result.outcome("uninstall-nsclient"), Some(&Outcome::Changed));
        assert!(host.calls().contains(&"run uninstall NSClient++ (Win32)".to_string()));
    }

    #[test]
    fn test_scenario_linux_skips_windows_rules() {
        let host = FakeHost::new();
        let facts: HostFacts = [("platform", "linux")].into_iter().collect();

        let result = converge(&host, &facts, &windows_uninstall_rules());

        assert!(result.applied.iter().all(|r| r.outcome == Outcome::Skipped));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_scenario_missing_conf_dir_skips_render() {
        let host = datadog_host();
        let facts = dd_facts(false, true);

        let result = converge(&host, &facts, &datadog_rules());

        assert_eq!(result.outcome("nagios-yaml"), Some(&Outcome::Skipped));
        assert_eq!(result.outcome("nagios-py"), Some(&Outcome::Changed));
        assert!(result.is_success());
        assert!(host.file("/etc/dd-agent/conf.d/nagios.yaml").is_none());
    }

    #[test]
    fn test_scenario_identical_content_is_noop_without_restart() {
        let host = datadog_host();
        host.put_file("/etc/dd-agent/conf.d/nagios.yaml", "init_config:\n");
        let facts = dd_facts(true, false);

        let result = converge(&host, &facts, &datadog_rules());

        assert_eq!(result.outcome("nagios-yaml"), Some(&Outcome::NoOp));
        assert!(result.notifications.is_empty());
        assert!(!host.calls().iter().any(|c| c.contains("restart")));
    }

    #[test]
    fn test_two_changed_renders_restart_once() {
        let host = datadog_host();
        let facts = dd_facts(true, true);

        let result = converge(&host, &facts, &datadog_rules());

        assert_eq!(result.outcome("nagios-yaml"), Some(&Outcome::Changed));
        assert_eq!(result.outcome("nagios-py"), Some(&Outcome::Changed));
        assert_eq!(result.outcome("datadog-agent"), Some(&Outcome::NoOp));
        assert_eq!(result.notifications.len(), 1);
        assert_eq!(
            result.notifications[0].requested_by,
            vec!["nagios-yaml", "nagios-py"]
        );
        let restarts = host
            .calls()
            .iter()
            .filter(|c| c.as_str() == "service datadog-agent restart")
            .count();
        assert_eq!(restarts, 1);
    }

    #[test]
    fn test_restart_comes_after_every_rule() {
        let host = datadog_host();
        let facts = dd_facts(true, true);

        converge(&host, &facts, &datadog_rules());

        let calls = host.calls();
        assert_eq!(
            calls.last().map(String::as_str),
            Some("service datadog-agent restart")
        );
    }

    #[test]
    fn test_second_pass_is_all_noop() {
        let host = datadog_host();
        host.add_service("nscp", true, true);
        host.install_product("NSClient++ (x64)");
        let facts = dd_facts(true, true);
        let windows: HostFacts = [("platform", "windows"), ("kernel.machine", "x86_64")]
            .into_iter()
            .collect();
        let opts = EvaluateOptions::default();

        for (facts, rules) in [(facts, datadog_rules()), (windows, windows_uninstall_rules())] {
            let first = evaluate_simple(&facts, &rules, &host.context(), &opts).unwrap();
            let second = evaluate_simple(&facts, &rules, &host.context(), &opts).unwrap();

            for (a, b) in first.applied.iter().zip(&second.applied) {
                if a.outcome == Outcome::Changed {
                    assert_eq!(b.outcome, Outcome::NoOp, "rule {} changed twice", a.rule_id);
                }
            }
            assert!(second.notifications.is_empty());
        }
    }

    #[test]
    fn test_facts_are_not_mutated() {
        let host = datadog_host();
        let facts = dd_facts(true, true);
        let before = facts.clone();

        converge(&host, &facts, &datadog_rules());

        assert_eq!(facts, before);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let host = datadog_host();
        host.add_service("nscp", true, true);
        host.install_product("NSClient++ (x64)");
        let opts = EvaluateOptions {
            dry_run: true,
            strict: false,
        };

        let rules = datadog_rules();
        let facts = dd_facts(true, true);
        let result = evaluate_simple(&facts, &rules, &host.context(), &opts).unwrap();
        assert!(result.dry_run);
        assert_eq!(result.outcome("nagios-yaml"), Some(&Outcome::Changed));
        assert_eq!(result.notifications[0].outcome, Outcome::Changed);
        assert!(host.file("/etc/dd-agent/conf.d/nagios.yaml").is_none());

        let windows: HostFacts = [("platform", "windows"), ("kernel.machine", "x86_64")]
            .into_iter()
            .collect();
        let rules = windows_uninstall_rules();
        let result = evaluate_simple(&windows, &rules, &host.context(), &opts).unwrap();
        assert_eq!(result.outcome("uninstall-nsclient"), Some(&Outcome::Changed));
        assert!(host.product_installed("NSClient++ (x64)"));
        assert!(host.service_running("nscp"));
    }

    #[test]
    fn test_failure_is_recorded_and_later_rules_still_run() {
        let host = FakeHost::new();
        host.add_service("datadog-agent", true, true);
        let rules = RuleSet::new(vec![
            Rule::new(
                "broken",
                Predicate::Always,
                Action::Service {
                    name: "ghost".into(),
                    states: vec![ServiceState::Start],
                },
            ),
            Rule::new(
                "stop-agent",
                Predicate::Always,
                Action::Service {
                    name: "datadog-agent".into(),
                    states: vec![ServiceState::Stop],
                },
            ),
        ])
        .unwrap();

        let result = converge(&host, &HostFacts::default(), &rules);

        assert!(matches!(result.outcome("broken"), Some(Outcome::Failed { .. })));
        assert_eq!(result.outcome("stop-agent"), Some(&Outcome::Changed));
        assert!(!result.is_success());
    }

    #[test]
    fn test_critical_failure_halts_with_partial_result() {
        let host = FakeHost::new();
        host.add_service("datadog-agent", true, true);
        let rules = RuleSet::new(vec![
            Rule::new(
                "broken",
                Predicate::Always,
                Action::Service {
                    name: "ghost".into(),
                    states: vec![ServiceState::Start],
                },
            )
            .critical(),
            Rule::new(
                "stop-agent",
                Predicate::Always,
                Action::Service {
                    name: "datadog-agent".into(),
                    states: vec![ServiceState::Stop],
                },
            ),
        ])
        .unwrap();

        let opts = EvaluateOptions::default();
        let facts = HostFacts::default();
        let err = evaluate_simple(&facts, &rules, &host.context(), &opts).unwrap_err();

        let EvaluateError::CriticalFailure { rule_id, .. } = &err;
        assert_eq!(rule_id, "broken");
        assert_eq!(err.partial().applied.len(), 1);
        assert!(host.service_running("datadog-agent"));
    }

    #[test]
    fn test_strict_mode_fails_rules_with_missing_facts() {
        let host = datadog_host();
        let facts: HostFacts = [("platform", "ubuntu")].into_iter().collect();
        let opts = EvaluateOptions {
            dry_run: false,
            strict: true,
        };

        let result = evaluate_simple(&facts, &datadog_rules(), &host.context(), &opts).unwrap();

        assert!(matches!(
            result.outcome("nagios-yaml"),
            Some(Outcome::Failed { reason }) if reason.contains("directory:/etc/dd-agent/conf.d")
        ));
        assert_eq!(result.outcome("datadog-agent"), Some(&Outcome::NoOp));
    }

    #[test]
    fn test_explicit_restart_suppresses_queued_restart() {
        let host = datadog_host();
        let rules = RuleSet::new(vec![
            Rule::new(
                "nagios-yaml",
                Predicate::Always,
                Action::Template {
                    path: "/etc/dd-agent/conf.d/nagios.yaml".into(),
                    template: "nagios.yaml".into(),
                    context: Vars::new(),
                },
            )
            .notifies("datadog-agent"),
            Rule::new(
                "datadog-agent",
                Predicate::Always,
                Action::Service {
                    name: "datadog-agent".into(),
                    states: vec![ServiceState::Restart],
                },
            ),
        ])
        .unwrap();

        let result = converge(&host, &HostFacts::default(), &rules);

        assert_eq!(result.outcome("datadog-agent"), Some(&Outcome::Changed));
        assert!(result.notifications.is_empty());
        let restarts = host.calls().iter().filter(|c| c.contains("restart")).count();
        assert_eq!(restarts, 1);
    }

    #[test]
    fn test_render_after_explicit_restart_restarts_again() {
        let host = datadog_host();
        let rules = RuleSet::new(vec![
            Rule::new(
                "datadog-agent",
                Predicate::Always,
                Action::Service {
                    name: "datadog-agent".into(),
                    states: vec![ServiceState::Restart],
                },
            ),
            Rule::new(
                "nagios-yaml",
                Predicate::Always,
                Action::Template {
                    path: "/etc/dd-agent/conf.d/nagios.yaml".into(),
                    template: "nagios.yaml".into(),
                    context: Vars::new(),
                },
            )
            .notifies("datadog-agent"),
        ])
        .unwrap();

        let result = converge(&host, &HostFacts::default(), &rules);

        assert_eq!(result.notifications.len(), 1);
        assert_eq!(result.notifications[0].requested_by, vec!["nagios-yaml"]);
        let restarts = host.calls().iter().filter(|c| c.contains("restart")).count();
        assert_eq!(restarts, 2);
    }

    #[test]
    fn test_strict_mode_fails_uninstall_when_arch_is_unknown() {
        let host = FakeHost::new();
        host.add_service("nscp", true, true);
        host.install_product("NSClient++ (Win32)");
        let facts: HostFacts = [("platform", "windows")].into_iter().collect();
        let opts = EvaluateOptions {
            dry_run: false,
            strict: true,
        };

        let rules = windows_uninstall_rules();
        let result = evaluate_simple(&facts, &rules, &host.context(), &opts).unwrap();

        assert!(matches!(
            result.outcome("uninstall-nsclient"),
            Some(Outcome::Failed { reason }) if reason.contains("kernel.machine")
        ));
        assert!(!host.calls().iter().any(|c| c.starts_with("run ")));
        assert!(host.product_installed("NSClient++ (Win32)"));
    }

    #[test]
    fn test_failed_uninstall_reports_exit_code() {
        let host = FakeHost::new();
        host.add_service("nscp", true, true);
        host.install_product("NSClient++ (x64)");
        host.fail_program("uninstall", 1603);
        let facts: HostFacts = [("platform", "windows"), ("kernel.machine", "x86_64")]
            .into_iter()
            .collect();

        let result = converge(&host, &facts, &windows_uninstall_rules());

        match result.outcome("uninstall-nsclient") {
            Some(Outcome::Failed { reason }) => assert!(reason.contains("1603"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_progress_sees_every_rule() {
        #[derive(Default)]
        struct Recorder {
            started: Vec<String>,
            completed: Vec<String>,
            notified: Vec<String>,
        }

        impl ProgressCallback for Recorder {
            fn on_rule_start(&mut self, id: &str, _description: &str) {
                self.started.push(id.to_string());
            }
            fn on_rule_complete(&mut self, outcome: &RuleOutcome) {
                self.completed.push(outcome.rule_id.clone());
            }
            fn on_notification(&mut self, outcome: &NotificationOutcome) {
                self.notified.push(outcome.service.clone());
            }
        }

        let host = datadog_host();
        let mut recorder = Recorder::default();
        evaluate(
            &dd_facts(true, true),
            &datadog_rules(),
            &host.context(),
            &EvaluateOptions::default(),
            &mut recorder,
        )
        .unwrap();

        assert_eq!(recorder.started, vec!["nagios-yaml", "nagios-py", "datadog-agent"]);
        assert_eq!(recorder.completed, recorder.started);
        assert_eq!(recorder.notified, vec!["datadog-agent"]);
    }
}
