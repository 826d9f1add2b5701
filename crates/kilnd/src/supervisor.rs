//! Lifecycle of the dispatcher and the auxiliary services.
//!
//! [`ServiceSupervisor::start`] creates the dispatcher and then starts, in
//! order, the API service, the gRPC API service when it is needed, the
//! dispatcher, and the admin service. Later steps read the addresses bound by
//! earlier ones, so each step blocks until the previous one is listening.
//! Services are recorded only once they have started, which lets
//! [`ServiceSupervisor::stop`] tear down exactly what is running, in reverse
//! order, whether startup completed or not.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use kiln_config::{
    DEFAULT_MODULE, Options, ResolvedOption, RuntimeConfigs, absolutise, resolve_storage_path,
    xsrf_path,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::ModuleCatalog;
use crate::dispatcher::{Dispatcher, DispatcherError, DispatcherPlan, ModulePlan};
use crate::health::HealthReporter;
use crate::services::{
    AdminServiceConfig, ApiServiceConfig, AuxiliaryService, GrpcApiServiceConfig, ServiceFactory,
    ServiceKind, ServiceStartError,
};
use crate::settings::effective_settings_for;

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");
const DISPATCHER_COMPONENT: &str = "dispatcher";
const MAX_INSTANCES_OPTION: &str = "max_module_instances";
const THREADSAFE_OPTION: &str = "threadsafe_override";

/// Lifecycle states of a [`ServiceSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Constructed, nothing started.
    Idle,
    /// Startup in progress.
    Starting,
    /// Every service and the dispatcher are running.
    Running,
    /// Teardown in progress.
    Stopping,
    /// Torn down after a successful start.
    Stopped,
    /// Startup failed; terminal.
    Failed,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        formatter.write_str(label)
    }
}

/// Errors surfaced by the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// An auxiliary service failed to start.
    #[error("startup aborted: {source}")]
    Start {
        /// Underlying service error.
        #[source]
        source: ServiceStartError,
    },
    /// The dispatcher failed or rejected a lookup.
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
    /// The operation is not valid in the current state.
    #[error("cannot {operation} while the supervisor is {state}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// State at the time of the attempt.
        state: SupervisorState,
    },
}

/// Settings the supervisor hands to the dispatcher and auxiliary services.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Application id.
    pub app_id: String,
    /// Emulated storage directory.
    pub storage_path: Utf8PathBuf,
    /// Dispatcher host.
    pub host: String,
    /// Dispatcher port; `0` for ephemeral ports.
    pub port: u16,
    /// Admin service host.
    pub admin_host: String,
    /// Admin service port.
    pub admin_port: u16,
    /// API service host.
    pub api_host: String,
    /// API service port.
    pub api_port: u16,
    /// APIs served by the gRPC API service.
    pub grpc_apis: Vec<String>,
    /// gRPC API service port.
    pub grpc_api_port: u16,
    /// Resolved `--max-module-instances`.
    pub max_module_instances: Option<ResolvedOption<u32>>,
    /// Resolved `--threadsafe-override`.
    pub threadsafe_override: Option<ResolvedOption<bool>>,
    /// Runtime settings.
    pub runtime_configs: RuntimeConfigs,
    /// Log level handed to runtimes.
    pub runtime_log_level: u8,
    /// Extra environment for runtimes.
    pub env_variables: BTreeMap<String, String>,
    /// Authorisation domain.
    pub auth_domain: String,
    /// Restart instances on source changes.
    pub automatic_restart: bool,
    /// Poll modification times to detect changes.
    pub use_mtime_file_watcher: bool,
    /// Expose skipped files to runtimes.
    pub allow_skipped_files: bool,
}

impl SupervisorConfig {
    /// Derives the supervisor settings from parsed options.
    ///
    /// Relative paths are resolved against `base`.
    #[must_use]
    pub fn from_options(options: &Options, app_id: &str, base: &Utf8Path) -> Self {
        let storage_path = resolve_storage_path(options.storage_path.as_deref(), app_id);
        Self {
            app_id: app_id.to_owned(),
            storage_path: absolutise(&storage_path, base),
            host: options.host.clone(),
            port: options.port,
            admin_host: options.admin_host.clone(),
            admin_port: options.admin_port,
            api_host: options.api_host.clone(),
            api_port: options.api_port,
            grpc_apis: options.grpc_apis.clone(),
            grpc_api_port: options.grpc_api_port,
            max_module_instances: options.max_module_instances.clone(),
            threadsafe_override: options.threadsafe_override.clone(),
            runtime_configs: RuntimeConfigs::from_options(options, base),
            runtime_log_level: options.log_level.runtime_level(),
            env_variables: options.env_variables(),
            auth_domain: options.auth_domain.clone(),
            automatic_restart: options.automatic_restart,
            use_mtime_file_watcher: options.use_mtime_file_watcher,
            allow_skipped_files: options.allow_skipped_files,
        }
    }
}

/// Starts and stops the dispatcher and auxiliary services as a unit.
pub struct ServiceSupervisor<F> {
    config: SupervisorConfig,
    catalog: Arc<dyn ModuleCatalog>,
    factory: F,
    reporter: Arc<dyn HealthReporter>,
    state: SupervisorState,
    services: Vec<Box<dyn AuxiliaryService>>,
    dispatcher: Option<Box<dyn Dispatcher>>,
}

impl<F: ServiceFactory> ServiceSupervisor<F> {
    /// Builds an idle supervisor.
    #[must_use]
    pub fn new(
        config: SupervisorConfig,
        catalog: Arc<dyn ModuleCatalog>,
        factory: F,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            config,
            catalog,
            factory,
            reporter,
            state: SupervisorState::Idle,
            services: Vec::new(),
            dispatcher: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Kinds of the services currently running, in start order.
    #[must_use]
    pub fn running_services(&self) -> Vec<ServiceKind> {
        self.services.iter().map(|service| service.kind()).collect()
    }

    /// Starts every service and the dispatcher.
    ///
    /// On failure the supervisor moves to [`SupervisorState::Failed`] and the
    /// services that did start remain recorded for [`Self::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] unless the supervisor is
    /// idle, and otherwise the first service or dispatcher failure.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if self.state != SupervisorState::Idle {
            return Err(SupervisorError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        self.state = SupervisorState::Starting;
        self.reporter.supervisor_starting();
        match self.start_sequence() {
            Ok(dispatch_address) => {
                self.state = SupervisorState::Running;
                self.reporter.supervisor_running(&dispatch_address);
                Ok(())
            }
            Err(error) => {
                self.state = SupervisorState::Failed;
                self.reporter.supervisor_failed(&error);
                Err(error)
            }
        }
    }

    /// Stops every running service in reverse start order, then the
    /// dispatcher. Failures are reported and do not interrupt teardown.
    /// Repeated calls are no-ops.
    pub fn stop(&mut self) {
        match self.state {
            SupervisorState::Starting | SupervisorState::Running => {
                self.state = SupervisorState::Stopping;
                self.teardown();
                self.state = SupervisorState::Stopped;
                self.reporter.supervisor_stopped();
            }
            SupervisorState::Failed => self.teardown(),
            SupervisorState::Idle | SupervisorState::Stopping | SupervisorState::Stopped => {}
        }
    }

    /// Address of `module`, or of the dispatcher itself when `module` is
    /// `None`.
    ///
    /// Named modules resolve against their default version; `instance`
    /// selects an individual instance instead of the balancer.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] when no dispatcher exists and
    /// [`SupervisorError::Dispatcher`] when the module, version, or instance
    /// is unknown.
    pub fn module_address(
        &self,
        module: Option<&str>,
        instance: Option<u32>,
    ) -> Result<String, SupervisorError> {
        let dispatcher = self
            .dispatcher
            .as_deref()
            .ok_or(SupervisorError::InvalidState {
                operation: "look up addresses",
                state: self.state,
            })?;
        let Some(module) = module else {
            return Ok(dispatcher.dispatch_address());
        };
        let version = dispatcher.get_default_version(module)?;
        Ok(dispatcher.get_hostname(module, &version, instance)?)
    }

    fn start_sequence(&mut self) -> Result<String, SupervisorError> {
        if self.config.port == 0 {
            warn!(
                target: SUPERVISOR_TARGET,
                "DEFAULT_VERSION_HOSTNAME will not be set correctly with --port=0"
            );
        }

        let plan = self.dispatcher_plan();
        self.dispatcher = Some(self.factory.dispatcher(plan));

        let api = self.factory.api_service(ApiServiceConfig {
            host: self.config.api_host.clone(),
            port: self.config.api_port,
            app_id: self.config.app_id.clone(),
            storage_path: self.config.storage_path.clone(),
        });
        let api_port = self.start_service(api)?;

        if self.grpc_api_required() {
            let grpc = self.factory.grpc_api_service(GrpcApiServiceConfig {
                host: self.config.api_host.clone(),
                port: self.config.grpc_api_port,
                apis: self.config.grpc_apis.clone(),
            });
            self.start_service(grpc)?;
        }

        let state = self.state;
        let dispatcher = self
            .dispatcher
            .as_mut()
            .ok_or(SupervisorError::InvalidState {
                operation: "start the dispatcher",
                state,
            })?;
        dispatcher.start(&self.config.api_host, api_port, &self.config.grpc_apis)?;
        let dispatch_address = dispatcher.dispatch_address();
        let modules = dispatcher.modules();
        let balanced_address = default_module_address(&**dispatcher)?;
        self.reporter.dispatcher_ready(&dispatch_address);

        if let Some(address) = balanced_address {
            for service in &mut self.services {
                if service.kind() == ServiceKind::Api {
                    service.set_balanced_address(&address);
                }
            }
        }

        let admin = self.factory.admin_service(AdminServiceConfig {
            host: self.config.admin_host.clone(),
            port: self.config.admin_port,
            app_id: self.config.app_id.clone(),
            xsrf_path: xsrf_path(&self.config.storage_path),
            dispatch_address: dispatch_address.clone(),
            modules,
        });
        self.start_service(admin)?;
        Ok(dispatch_address)
    }

    fn dispatcher_plan(&self) -> DispatcherPlan {
        let declared = self.catalog.module_names();
        let max_instances = effective_settings_for(
            self.config.max_module_instances.as_ref(),
            &declared,
            MAX_INSTANCES_OPTION,
        );
        let threadsafe = effective_settings_for(
            self.config.threadsafe_override.as_ref(),
            &declared,
            THREADSAFE_OPTION,
        );
        let modules = self
            .catalog
            .modules()
            .iter()
            .map(|module| ModulePlan {
                name: module.name.clone(),
                runtime: module.runtime.clone(),
                version: module.version.clone(),
                threadsafe: threadsafe
                    .get(&module.name)
                    .copied()
                    .unwrap_or(module.threadsafe),
                max_instances: max_instances.get(&module.name).copied(),
                manual_instances: module.instances,
            })
            .collect();
        DispatcherPlan {
            host: self.config.host.clone(),
            port: self.config.port,
            modules,
            runtime_configs: self.config.runtime_configs.clone(),
            runtime_log_level: self.config.runtime_log_level,
            env_variables: self.config.env_variables.clone(),
            auth_domain: self.config.auth_domain.clone(),
            automatic_restart: self.config.automatic_restart,
            use_mtime_file_watcher: self.config.use_mtime_file_watcher,
            allow_skipped_files: self.config.allow_skipped_files,
        }
    }

    fn grpc_api_required(&self) -> bool {
        !self.config.grpc_apis.is_empty()
            || self.catalog.modules().iter().any(|module| module.grpc_api)
    }

    fn start_service(
        &mut self,
        mut service: Box<dyn AuxiliaryService>,
    ) -> Result<u16, SupervisorError> {
        let kind = service.kind();
        self.reporter.service_starting(kind);
        if let Err(source) = service.start() {
            self.reporter.service_failed(&source);
            return Err(SupervisorError::Start { source });
        }
        let port = service.port();
        self.reporter.service_ready(kind, port);
        self.services.push(service);
        Ok(port)
    }

    fn teardown(&mut self) {
        while let Some(mut service) = self.services.pop() {
            let component = service.kind().to_string();
            match service.quit() {
                Ok(()) => self.reporter.component_stopped(&component),
                Err(error) => self.reporter.teardown_failed(&component, &error),
            }
        }
        if let Some(mut dispatcher) = self.dispatcher.take() {
            match dispatcher.quit() {
                Ok(()) => self.reporter.component_stopped(DISPATCHER_COMPONENT),
                Err(error) => self.reporter.teardown_failed(DISPATCHER_COMPONENT, &error),
            }
        }
    }
}

/// Balanced address of the default module, or `None` when the application
/// declares no default module.
fn default_module_address(dispatcher: &dyn Dispatcher) -> Result<Option<String>, DispatcherError> {
    match dispatcher.get_module_by_name(DEFAULT_MODULE) {
        Ok(module) => {
            let address = dispatcher.get_hostname(&module.name, &module.version, None)?;
            debug!(
                target: SUPERVISOR_TARGET,
                address = address.as_str(),
                "propagating default module address"
            );
            Ok(Some(address))
        }
        Err(DispatcherError::ModuleNotFound { .. }) => {
            warn!(target: SUPERVISOR_TARGET, "No default module found. Ignoring.");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}
