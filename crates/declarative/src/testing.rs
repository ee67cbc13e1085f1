//! In-memory host used by the engine's tests

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::context::{
    ApplyContext, CommandRunner, FileStore, GroupManager, ServiceController, TemplateRenderer,
};
use crate::error::ActionError;
use crate::rule::{ServiceState, interpolate};
use crate::types::CommandOutput;

#[derive(Debug, Clone, Copy)]
struct ServiceStatus {
    running: bool,
    enabled: bool,
}

/// Fake host. `uninstall <product>` removes an installed product and
/// `absent <product>` exits 0 when the product is not installed.
#[derive(Default)]
pub struct FakeHost {
    services: RefCell<HashMap<String, ServiceStatus>>,
    files: RefCell<HashMap<String, Vec<u8>>>,
    templates: RefCell<HashMap<String, String>>,
    products: RefCell<HashSet<String>>,
    groups: RefCell<HashMap<String, Vec<String>>>,
    failing: RefCell<HashMap<String, i32>>,
    calls: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> ApplyContext<'_> {
        ApplyContext {
            services: self,
            templates: self,
            files: self,
            commands: self,
            groups: self,
        }
    }

    pub fn add_service(&self, name: &str, running: bool, enabled: bool) {
        self.services
            .borrow_mut()
            .insert(name.to_string(), ServiceStatus { running, enabled });
    }

    pub fn add_template(&self, id: &str, body: &str) {
        self.templates
            .borrow_mut()
            .insert(id.to_string(), body.to_string());
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.as_bytes().to_vec());
    }

    pub fn install_product(&self, name: &str) {
        self.products.borrow_mut().insert(name.to_string());
    }

    pub fn add_group(&self, group: &str, members: &[&str]) {
        self.groups.borrow_mut().insert(
            group.to_string(),
            members.iter().map(|m| (*m).to_string()).collect(),
        );
    }

    /// Make `program` exit with `code`
    pub fn fail_program(&self, program: &str, code: i32) {
        self.failing.borrow_mut().insert(program.to_string(), code);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }

    pub fn product_installed(&self, name: &str) -> bool {
        self.products.borrow().contains(name)
    }

    pub fn service_running(&self, name: &str) -> bool {
        self.services.borrow().get(name).is_some_and(|s| s.running)
    }

    pub fn group(&self, group: &str) -> Vec<String> {
        self.groups.borrow().get(group).cloned().unwrap_or_default()
    }

    /// Every mutating call, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn transition(status: ServiceStatus, states: &[ServiceState]) -> (ServiceStatus, bool) {
        let mut s = status;
        let mut changed = false;
        for state in states {
            let before = (s.running, s.enabled);
            match state {
                ServiceState::Start => s.running = true,
                ServiceState::Stop => s.running = false,
                ServiceState::Enable => s.enabled = true,
                ServiceState::Disable => s.enabled = false,
                ServiceState::Restart => {
                    s.running = true;
                    changed = true;
                }
            }
            changed |= before != (s.running, s.enabled);
        }
        (s, changed)
    }
}

impl ServiceController for FakeHost {
    fn check(&self, name: &str, states: &[ServiceState]) -> Result<bool, ActionError> {
        let status = self.services.borrow().get(name).copied();
        let status = status.ok_or_else(|| ActionError::service(format!("unknown service {name}")))?;
        Ok(Self::transition(status, states).1)
    }

    fn set_state(&self, name: &str, states: &[ServiceState]) -> Result<bool, ActionError> {
        let status = self.services.borrow().get(name).copied();
        let status = status.ok_or_else(|| ActionError::service(format!("unknown service {name}")))?;
        let (next, changed) = Self::transition(status, states);
        if changed {
            let states: Vec<String> = states.iter().map(ToString::to_string).collect();
            self.calls
                .borrow_mut()
                .push(format!("service {name} {}", states.join(",")));
            self.services.borrow_mut().insert(name.to_string(), next);
        }
        Ok(changed)
    }
}

impl TemplateRenderer for FakeHost {
    fn render(
        &self,
        template_id: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, ActionError> {
        let templates = self.templates.borrow();
        let body = templates
            .get(template_id)
            .ok_or_else(|| ActionError::render(format!("no template {template_id}")))?;
        interpolate(body, context)
            .map(String::into_bytes)
            .map_err(|e| ActionError::render(e.to_string()))
    }
}

impl FileStore for FakeHost {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ActionError> {
        Ok(self.files.borrow().get(path).cloned())
    }

    fn write_atomic(&self, path: &str, content: &[u8]) -> Result<(), ActionError> {
        self.calls.borrow_mut().push(format!("write {path}"));
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ActionError> {
        self.calls
            .borrow_mut()
            .push(format!("run {program} {}", args.join(" ")));

        if let Some(code) = self.failing.borrow().get(program) {
            return Ok(CommandOutput {
                exit_code: Some(*code),
                stdout: Vec::new(),
                stderr: b"simulated failure".to_vec(),
            });
        }

        let product = args.join(" ");
        let code = match program {
            "uninstall" => {
                self.products.borrow_mut().remove(&product);
                0
            }
            "absent" => i32::from(self.products.borrow().contains(&product)),
            _ => return Err(ActionError::process(format!("{program}: not found"))),
        };
        Ok(CommandOutput {
            exit_code: Some(code),
            ..Default::default()
        })
    }
}

impl GroupManager for FakeHost {
    fn members(&self, group: &str) -> Result<Vec<String>, ActionError> {
        self.groups
            .borrow()
            .get(group)
            .cloned()
            .ok_or_else(|| ActionError::group(format!("no such group {group}")))
    }

    fn set_members(&self, group: &str, members: &[String]) -> Result<(), ActionError> {
        self.calls
            .borrow_mut()
            .push(format!("group {group} {}", members.join(",")));
        self.groups
            .borrow_mut()
            .insert(group.to_string(), members.to_vec());
        Ok(())
    }
}
