//! Built-in recipes
//!
//! Each recipe is an ordered list of rules. Recipes can be selected on the
//! command line or listed in a cookbook's `recipes` field; their rules run
//! before the cookbook's own.

use anyhow::{Result, bail};
use declarative::facts::{DIRECTORY_PROBE, USER_PROBE};
use declarative::{Action, CommandSpec, Predicate, Rule, ServiceState, ValueExpr, Vars};

/// A named, built-in rule list
pub struct Recipe {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> Vec<Rule>,
}

impl Recipe {
    pub fn rules(&self) -> Vec<Rule> {
        (self.build)()
    }
}

pub const RECIPES: &[Recipe] = &[
    Recipe {
        name: "nagios::client_windows_uninstall",
        description: "Stop the NSClient++ service and uninstall the package (Windows)",
        build: client_windows_uninstall,
    },
    Recipe {
        name: "nagios::datadog_check",
        description: "Install the Nagios check for the Datadog agent",
        build: datadog_check,
    },
];

pub fn find(name: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.name == name)
}

/// Concatenate the rules of the named recipes in the given order
pub fn rules_for(names: &[String]) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for name in names {
        let Some(recipe) = find(name) else {
            let known: Vec<&str> = RECIPES.iter().map(|r| r.name).collect();
            bail!("Unknown recipe '{name}' (known: {})", known.join(", "));
        };
        rules.extend(recipe.rules());
    }
    Ok(rules)
}

const NSCLIENT_FILTER: &str = "Get-WmiObject -Class Win32_Product -Filter \
                               \"Name = 'NSClient++ ({{ arch }})'\"";

fn powershell(script: &str) -> CommandSpec {
    CommandSpec::new("powershell.exe", &["-NoProfile", "-NonInteractive", "-Command", script])
}

fn client_windows_uninstall() -> Vec<Rule> {
    let on_windows = Predicate::equals("platform", "windows");

    let mut vars = Vars::new();
    vars.insert(
        "arch".into(),
        ValueExpr::Choose {
            when: Predicate::equals("kernel.machine", "x86_64"),
            then: "x64".into(),
            otherwise: "Win32".into(),
        },
    );

    vec![
        Rule::new(
            "nscp-service",
            on_windows.clone(),
            Action::Service {
                name: "nscp".into(),
                states: vec![ServiceState::Stop, ServiceState::Disable],
            },
        ),
        Rule::new(
            "nsclient-uninstall",
            on_windows,
            Action::Uninstall {
                command: powershell(&format!("$app = {NSCLIENT_FILTER}; $app.Uninstall()")),
                unless: Some(powershell(&format!(
                    "if ({NSCLIENT_FILTER}) {{ exit 1 }} else {{ exit 0 }}"
                ))),
                vars,
            },
        ),
    ]
}

fn directory(path: &str) -> Predicate {
    Predicate::truthy(&format!("{DIRECTORY_PROBE}{path}"))
}

fn datadog_check() -> Vec<Rule> {
    let mut config = Vars::new();
    config.insert("check_freq".into(), ValueExpr::literal("15"));
    config.insert("nagios_conf".into(), ValueExpr::literal("/etc/nagios3/nagios.cfg"));
    config.insert("status_file".into(), ValueExpr::literal("/var/cache/nagios3/status.dat"));

    let mut script = Vars::new();
    script.insert("check_class".into(), ValueExpr::literal("NagiosCheck"));

    vec![
        Rule::new(
            "dd-agent-www-data",
            Predicate::truthy(&format!("{USER_PROBE}dd-agent")),
            Action::GroupMembers {
                group: "www-data".into(),
                members: vec!["dd-agent".into()],
                append: true,
            },
        ),
        Rule::new(
            "nagios-check-config",
            directory("/etc/dd-agent/conf.d"),
            Action::Template {
                path: "/etc/dd-agent/conf.d/nagios.yaml".into(),
                template: "datadog_check.yaml".into(),
                context: config,
            },
        )
        .notifies("datadog-agent"),
        Rule::new(
            "nagios-check-script",
            directory("/etc/dd-agent/checks.d"),
            Action::Template {
                path: "/etc/dd-agent/checks.d/nagios.py".into(),
                template: "datadog_check.py".into(),
                context: script,
            },
        )
        .notifies("datadog-agent"),
        Rule::new(
            "datadog-agent",
            Predicate::Always,
            Action::Service {
                name: "datadog-agent".into(),
                states: Vec::new(),
            },
        ),
    ]
}
