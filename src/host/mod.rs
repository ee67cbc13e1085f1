//! Real collaborators for the convergence engine

pub mod files;
pub mod group;
pub mod service;
pub mod template;

use declarative::ApplyContext;

use crate::runner::ProcessRunner;

pub use files::LocalFiles;
pub use group::SystemGroups;
pub use service::SystemServices;
pub use template::TemplateLibrary;

/// Everything a pass on this machine needs
pub struct Host {
    pub services: SystemServices,
    pub templates: TemplateLibrary,
    pub files: LocalFiles,
    pub commands: ProcessRunner,
    pub groups: SystemGroups,
}

impl Host {
    pub fn new(templates: TemplateLibrary, commands: ProcessRunner) -> Self {
        Self {
            services: SystemServices::new(commands.clone()),
            templates,
            files: LocalFiles,
            groups: SystemGroups::new(commands.clone()),
            commands,
        }
    }

    pub fn context(&self) -> ApplyContext<'_> {
        ApplyContext {
            services: &self.services,
            templates: &self.templates,
            files: &self.files,
            commands: &self.commands,
            groups: &self.groups,
        }
    }
}
