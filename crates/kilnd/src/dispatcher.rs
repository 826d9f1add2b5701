//! The dispatcher capability driven by the supervisor.
//!
//! A dispatcher owns the running modules and their network bindings. The
//! supervisor only starts it, asks it for addresses, and quits it; any type
//! implementing [`Dispatcher`] can stand in for the bundled
//! [`LocalDispatcher`](crate::LocalDispatcher).

use std::collections::BTreeMap;

use kiln_config::RuntimeConfigs;
use serde::Serialize;
use thiserror::Error;

use crate::transport::ListenerError;

/// Errors reported by a dispatcher.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// The module is not declared by the application.
    #[error("module '{module}' does not exist")]
    ModuleNotFound {
        /// Requested module name.
        module: String,
    },
    /// The module does not serve the requested version.
    #[error("version '{version}' of module '{module}' does not exist")]
    VersionNotFound {
        /// Module name.
        module: String,
        /// Requested version.
        version: String,
    },
    /// The module has no instance with the requested index.
    #[error("instance {instance} of module '{module}' does not exist")]
    InstanceNotFound {
        /// Module name.
        module: String,
        /// Requested instance index.
        instance: u32,
    },
    /// Sequential port allocation ran past 65535.
    #[error("no port is available for '{name}' after port {base}")]
    PortExhausted {
        /// Listener that needed a port.
        name: String,
        /// First port of the sequence.
        base: u16,
    },
    /// A listener failed to bind, start, or stop.
    #[error("dispatcher listener '{name}' failed: {source}")]
    Listener {
        /// Listener name, such as `module default`.
        name: String,
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

/// Resolved settings for one module handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModulePlan {
    /// Module name.
    pub name: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Default version.
    pub version: String,
    /// Effective threadsafe flag after any override.
    pub threadsafe: bool,
    /// Instance cap after any per-module override.
    pub max_instances: Option<u32>,
    /// Fixed instance count for manually scaled modules.
    pub manual_instances: Option<u32>,
}

/// Everything a dispatcher needs to serve the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherPlan {
    /// Host the front and module listeners bind to.
    pub host: String,
    /// Port of the front listener; `0` allocates every port dynamically.
    pub port: u16,
    /// Modules in declaration order.
    pub modules: Vec<ModulePlan>,
    /// Runtime settings shared by every instance.
    pub runtime_configs: RuntimeConfigs,
    /// Application log level handed to runtimes (0 = debug .. 4 = critical).
    pub runtime_log_level: u8,
    /// Extra environment for runtimes.
    pub env_variables: BTreeMap<String, String>,
    /// Authorisation domain reported to runtimes.
    pub auth_domain: String,
    /// Restart instances when their sources change.
    pub automatic_restart: bool,
    /// Detect source changes by polling modification times.
    pub use_mtime_file_watcher: bool,
    /// Expose skipped and static files to runtimes.
    pub allow_skipped_files: bool,
}

/// Snapshot of a module as served by a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    /// Module name.
    pub name: String,
    /// Default version.
    pub version: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Effective threadsafe flag.
    pub threadsafe: bool,
    /// Instance cap, if any.
    pub max_instances: Option<u32>,
    /// Address that balances across the module's instances.
    pub balanced_address: String,
    /// Addresses of individually addressable instances, by index.
    pub instance_addresses: Vec<String>,
}

/// Capability owning the running modules.
pub trait Dispatcher: Send {
    /// Binds every module, recording the API endpoint injected into runtimes.
    fn start(
        &mut self,
        api_host: &str,
        api_port: u16,
        grpc_apis: &[String],
    ) -> Result<(), DispatcherError>;

    /// Stops every module. Calling it again, or before `start`, is a no-op.
    fn quit(&mut self) -> Result<(), DispatcherError>;

    /// Address of `instance` of `module` at `version`, or of the balancer
    /// when `instance` is `None`.
    fn get_hostname(
        &self,
        module: &str,
        version: &str,
        instance: Option<u32>,
    ) -> Result<String, DispatcherError>;

    /// Default version of `module`.
    fn get_default_version(&self, module: &str) -> Result<String, DispatcherError>;

    /// Summary of `module`.
    fn get_module_by_name(&self, module: &str) -> Result<ModuleSummary, DispatcherError>;

    /// Summaries of every module in declaration order.
    fn modules(&self) -> Vec<ModuleSummary>;

    /// Externally reachable address of the dispatcher itself.
    fn dispatch_address(&self) -> String;
}
