//! BDD test world: a supervisor wired to recording doubles plus the results
//! of the steps run against it.

use std::cell::RefCell;
use std::sync::Arc;

use camino::Utf8Path;
use kiln_config::Options;

use crate::application::{ApplicationConfiguration, ModuleCatalog, ModuleConfiguration};
use crate::supervisor::{ServiceSupervisor, SupervisorConfig, SupervisorError};

use super::reporter::RecordingHealthReporter;
use super::services::RecordingFactory;

/// Builds supervisor settings from command-line style arguments.
///
/// The config file argument is appended, so callers pass only flags.
#[must_use]
pub fn supervisor_config(flags: &[&str]) -> SupervisorConfig {
    let mut args = vec!["kilnd", "--storage-path", "/tmp/kiln-tests"];
    args.extend_from_slice(flags);
    args.push("app.yaml");
    let options = Options::load_from_iter(args).expect("test options should parse");
    SupervisorConfig::from_options(&options, "demo", Utf8Path::new("/srv/demo"))
}

/// Declares a module with the given runtime defaults.
#[must_use]
pub fn module(name: &str) -> ModuleConfiguration {
    ModuleConfiguration {
        name: name.to_owned(),
        runtime: "custom".to_owned(),
        version: "1".to_owned(),
        threadsafe: false,
        instances: None,
        grpc_api: false,
    }
}

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    pub factory: RecordingFactory,
    pub reporter: Arc<RecordingHealthReporter>,
    modules: Vec<ModuleConfiguration>,
    flags: Vec<String>,
    supervisor: Option<ServiceSupervisor<RecordingFactory>>,
    start_result: Option<Result<(), SupervisorError>>,
    pub address_result: Option<Result<String, SupervisorError>>,
}

impl TestWorld {
    /// Builds an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factory: RecordingFactory::default(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            modules: Vec::new(),
            flags: Vec::new(),
            supervisor: None,
            start_result: None,
            address_result: None,
        }
    }

    /// Declares `modules` in order.
    pub fn declare(&mut self, modules: impl IntoIterator<Item = ModuleConfiguration>) {
        self.modules.extend(modules);
    }

    /// Mutable access to a declared module.
    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleConfiguration> {
        self.modules.iter_mut().find(|module| module.name == name)
    }

    /// Adds a command-line flag used when the supervisor is built.
    pub fn add_flag(&mut self, flag: impl Into<String>) {
        self.flags.push(flag.into());
    }

    /// Builds the supervisor and starts it once.
    pub fn start(&mut self) {
        if self.start_result.is_some() {
            return;
        }
        let flags: Vec<&str> = self.flags.iter().map(String::as_str).collect();
        let catalog: Arc<dyn ModuleCatalog> =
            Arc::new(ApplicationConfiguration::new("demo", self.modules.clone()));
        let mut supervisor = ServiceSupervisor::new(
            supervisor_config(&flags),
            catalog,
            self.factory.clone(),
            self.reporter.clone(),
        );
        self.start_result = Some(supervisor.start());
        self.supervisor = Some(supervisor);
    }

    /// Stops the supervisor, if one was built.
    pub fn stop(&mut self) {
        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.stop();
        }
    }

    /// Looks up a module address and records the result.
    pub fn look_up(&mut self, module: Option<&str>, instance: Option<u32>) {
        self.address_result = self
            .supervisor
            .as_ref()
            .map(|supervisor| supervisor.module_address(module, instance));
    }

    /// Result of the start attempt.
    #[must_use]
    pub fn start_result(&self) -> Option<&Result<(), SupervisorError>> {
        self.start_result.as_ref()
    }

    /// The supervisor under test.
    #[must_use]
    pub fn supervisor(&self) -> Option<&ServiceSupervisor<RecordingFactory>> {
        self.supervisor.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture constructor used by the behaviour suite.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
