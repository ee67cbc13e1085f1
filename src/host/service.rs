//! Service control through systemd (`systemctl`) or the Windows service
//! control manager (`sc.exe`)

use declarative::{ActionError, CommandOutput, CommandRunner, ServiceController, ServiceState};
use std::thread;
use std::time::{Duration, Instant};

use crate::runner::ProcessRunner;

/// `sc.exe` exit code for "The specified service does not exist"
const SC_NO_SUCH_SERVICE: i32 = 1060;
/// `sc.exe` exit code for "The service has not been started"
const SC_NOT_ACTIVE: i32 = 1062;

/// How long a Windows service may stay `*_PENDING` after start or stop
const SC_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);
const SC_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manager {
    Systemd,
    ServiceControl,
}

impl Manager {
    fn for_host() -> Self {
        if cfg!(windows) {
            Self::ServiceControl
        } else {
            Self::Systemd
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Status {
    running: bool,
    enabled: bool,
}

pub struct SystemServices<R = ProcessRunner> {
    runner: R,
    manager: Manager,
    settle_timeout: Duration,
    poll_interval: Duration,
}

impl<R: CommandRunner> SystemServices<R> {
    pub fn new(runner: R) -> Self {
        Self::with_manager(runner, Manager::for_host())
    }

    pub fn with_manager(runner: R, manager: Manager) -> Self {
        Self {
            runner,
            manager,
            settle_timeout: SC_SETTLE_TIMEOUT,
            poll_interval: SC_POLL_INTERVAL,
        }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ActionError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        self.runner.run(program, &args)
    }

    fn status(&self, name: &str) -> Result<Status, ActionError> {
        match self.manager {
            Manager::Systemd => {
                let out = self.run(
                    "systemctl",
                    &[
                        "show",
                        "--property=LoadState,ActiveState,UnitFileState",
                        name,
                    ],
                )?;
                if !out.success() {
                    return Err(ActionError::service(format!(
                        "systemctl show {name}: {}",
                        out.stderr_str().trim()
                    )));
                }
                parse_systemctl_show(name, &out.stdout_str())
            }
            Manager::ServiceControl => {
                let query = self.run("sc.exe", &["query", name])?;
                if query.exit_code == Some(SC_NO_SUCH_SERVICE) {
                    return Err(ActionError::service(format!("unknown service {name}")));
                }
                let config = self.run("sc.exe", &["qc", name])?;
                Ok(parse_sc(&query.stdout_str(), &config.stdout_str()))
            }
        }
    }

    fn checked(&self, program: &str, args: &[&str]) -> Result<(), ActionError> {
        let out = self.run(program, args)?;
        exit_ok(program, args, &out)
    }

    /// One `sc.exe` step. `start` and `stop` return as soon as the request
    /// is queued, so each waits for the service to settle.
    fn sc_step(&self, name: &str, step: ServiceState, running: bool) -> Result<(), ActionError> {
        match step {
            ServiceState::Start => self.sc_start(name),
            ServiceState::Stop => self.sc_stop(name),
            ServiceState::Restart => {
                if running {
                    self.sc_stop(name)?;
                }
                self.sc_start(name)
            }
            ServiceState::Enable => self.checked("sc.exe", &["config", name, "start=", "auto"]),
            ServiceState::Disable => {
                self.checked("sc.exe", &["config", name, "start=", "disabled"])
            }
        }
    }

    fn sc_start(&self, name: &str) -> Result<(), ActionError> {
        self.checked("sc.exe", &["start", name])?;
        self.wait_for(name, "RUNNING")
    }

    fn sc_stop(&self, name: &str) -> Result<(), ActionError> {
        let out = self.run("sc.exe", &["stop", name])?;
        if out.exit_code != Some(SC_NOT_ACTIVE) {
            exit_ok("sc.exe", &["stop", name], &out)?;
        }
        self.wait_for(name, "STOPPED")
    }

    /// Poll `sc.exe query` until the service reports `state`
    fn wait_for(&self, name: &str, state: &str) -> Result<(), ActionError> {
        let deadline = Instant::now() + self.settle_timeout;
        loop {
            let query = self.run("sc.exe", &["query", name])?;
            let current = sc_state(&query.stdout_str());
            if current == state {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ActionError::timeout(format!(
                    "{name} is still {current} after {:?}, expected {state}",
                    self.settle_timeout
                )));
            }
            log::debug!("{name} is {current}, waiting for {state}");
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

fn exit_ok(program: &str, args: &[&str], out: &CommandOutput) -> Result<(), ActionError> {
    if out.success() {
        return Ok(());
    }
    let code = out
        .exit_code
        .map_or_else(|| "a signal".to_string(), |c| c.to_string());
    Err(ActionError::service(format!(
        "{program} {} exited with {code}: {}",
        args.join(" "),
        out.stderr_str().trim()
    )))
}

/// States that still need to run, given the current status
fn pending_steps(mut status: Status, states: &[ServiceState]) -> Vec<ServiceState> {
    let mut steps = Vec::new();
    for &state in states {
        let needed = match state {
            ServiceState::Start => !status.running,
            ServiceState::Stop => status.running,
            ServiceState::Enable => !status.enabled,
            ServiceState::Disable => status.enabled,
            ServiceState::Restart => true,
        };
        match state {
            ServiceState::Start | ServiceState::Restart => status.running = true,
            ServiceState::Stop => status.running = false,
            ServiceState::Enable => status.enabled = true,
            ServiceState::Disable => status.enabled = false,
        }
        if needed {
            steps.push(state);
        }
    }
    steps
}

fn property<'a>(output: &'a str, key: &str) -> &'a str {
    output
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
        .unwrap_or_default()
}

fn parse_systemctl_show(name: &str, output: &str) -> Result<Status, ActionError> {
    if property(output, "LoadState") == "not-found" {
        return Err(ActionError::service(format!("unknown service {name}")));
    }
    Ok(Status {
        running: matches!(
            property(output, "ActiveState"),
            "active" | "activating" | "reloading"
        ),
        enabled: matches!(
            property(output, "UnitFileState"),
            "enabled" | "enabled-runtime" | "static"
        ),
    })
}

fn sc_field<'a>(text: &'a str, key: &str) -> &'a str {
    text.lines()
        .find(|line| line.trim_start().starts_with(key))
        .unwrap_or_default()
}

/// State name from `sc.exe query`, e.g. `STOP_PENDING`
fn sc_state(query: &str) -> String {
    sc_field(query, "STATE")
        .split_whitespace()
        .last()
        .filter(|word| *word != ":")
        .unwrap_or("UNKNOWN")
        .to_string()
}

fn parse_sc(query: &str, config: &str) -> Status {
    let state = sc_state(query);
    Status {
        running: state == "RUNNING" || state == "START_PENDING",
        enabled: !sc_field(config, "START_TYPE").contains("DISABLED"),
    }
}

impl<R: CommandRunner> ServiceController for SystemServices<R> {
    fn check(&self, name: &str, states: &[ServiceState]) -> Result<bool, ActionError> {
        let status = self.status(name)?;
        Ok(!pending_steps(status, states).is_empty())
    }

    fn set_state(&self, name: &str, states: &[ServiceState]) -> Result<bool, ActionError> {
        let status = self.status(name)?;
        let steps = pending_steps(status, states);

        let mut running = status.running;
        for &step in &steps {
            log::info!("{step} service {name}");
            match self.manager {
                Manager::Systemd => self.checked("systemctl", &[step.to_string().as_str(), name])?,
                Manager::ServiceControl => self.sc_step(name, step, running)?,
            }
            running = match step {
                ServiceState::Start | ServiceState::Restart => true,
                ServiceState::Stop => false,
                ServiceState::Enable | ServiceState::Disable => running,
            };
        }
        Ok(!steps.is_empty())
    }
}
