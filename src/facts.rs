//! Facts about the local machine
//!
//! Static facts (`platform`, `kernel.machine`, ...) are computed on demand.
//! Probe facts (`user:`, `directory:`, `file:`, `command:`) run a single
//! check against the host. Facts loaded from a JSON file take precedence
//! over both, which lets a run pretend to be another machine.

use anyhow::{Context, Result};
use declarative::facts::{COMMAND_PROBE, DIRECTORY_PROBE, FILE_PROBE, USER_PROBE};
use declarative::{ActionError, FactSource, FactValue, HostFacts};
use std::fs;
use std::path::Path;

use crate::paths;
use crate::runner;

/// Facts every host reports, gathered for `watchpost facts`
pub const STATIC_KEYS: &[&str] = &[
    "platform",
    "platform_family",
    "kernel.name",
    "kernel.machine",
    "hostname",
];

const OS_RELEASE: &str = "/etc/os-release";

#[derive(Debug, Default)]
pub struct SystemFacts {
    overrides: HostFacts,
}

impl SystemFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HostFacts) -> Self {
        Self { overrides }
    }

    /// Read a JSON object of fact values
    pub fn load_overrides(path: &Path) -> Result<HostFacts> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid facts file {}", path.display()))
    }

    fn probe(&self, key: &str) -> Option<FactValue> {
        if let Some(name) = key.strip_prefix(USER_PROBE) {
            return Some(user_exists(name).into());
        }
        if let Some(path) = key.strip_prefix(DIRECTORY_PROBE) {
            return Some(paths::expand(path).is_dir().into());
        }
        if let Some(path) = key.strip_prefix(FILE_PROBE) {
            return Some(paths::expand(path).is_file().into());
        }
        if let Some(program) = key.strip_prefix(COMMAND_PROBE) {
            return Some(runner::command_exists(program).into());
        }
        None
    }
}

impl FactSource for SystemFacts {
    fn lookup(&self, key: &str) -> Result<Option<FactValue>, ActionError> {
        if let Some(value) = self.overrides.get(key) {
            return Ok(Some(value.clone()));
        }
        if let Some(value) = self.probe(key) {
            return Ok(Some(value));
        }

        let value = match key {
            "platform" => platform().0,
            "platform_family" => platform().1,
            "kernel.name" => kernel_name().to_string(),
            "kernel.machine" => kernel_machine().to_string(),
            "hostname" => match runner::run_capture("hostname", &[]) {
                Ok(name) => name,
                Err(e) => {
                    log::debug!("hostname unavailable: {e}");
                    return Ok(None);
                }
            },
            _ => return Ok(None),
        };
        Ok(Some(value.into()))
    }
}

/// Platform name and family, named the way Chef's Ohai names them
fn platform() -> (String, String) {
    match std::env::consts::OS {
        "windows" => pair("windows", "windows"),
        "macos" => pair("mac_os_x", "mac_os_x"),
        "linux" => match fs::read_to_string(OS_RELEASE) {
            Ok(content) => linux_platform(&content),
            Err(_) => pair("linux", "linux"),
        },
        other => pair(other, other),
    }
}

fn pair(name: &str, family: &str) -> (String, String) {
    (name.to_string(), family.to_string())
}

fn linux_platform(os_release: &str) -> (String, String) {
    let field = |name: &str| {
        os_release.lines().find_map(|line| {
            let value = line.strip_prefix(name)?.strip_prefix('=')?;
            Some(value.trim_matches('"').to_string())
        })
    };

    let id = field("ID").unwrap_or_else(|| "linux".to_string());
    let like = field("ID_LIKE").unwrap_or_default();
    let related = |name: &str| id == name || like.split_whitespace().any(|l| l == name);

    let family = if related("debian") {
        "debian"
    } else if id == "fedora" {
        "fedora"
    } else if related("rhel") || related("fedora") {
        "rhel"
    } else if related("suse") {
        "suse"
    } else if related("arch") {
        "arch"
    } else {
        id.as_str()
    };
    let family = family.to_string();
    (id, family)
}

fn kernel_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows_NT",
        other => other,
    }
}

fn kernel_machine() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i686",
        other => other,
    }
}

fn user_exists(name: &str) -> bool {
    if cfg!(windows) {
        runner::run_quiet("net", &["user", name])
    } else {
        runner::run_quiet("id", &["-u", name])
    }
}
