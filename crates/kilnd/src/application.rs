//! Loads the modules an application declares from its YAML files.
//!
//! Each configuration file declares one module:
//!
//! ```yaml
//! application: guestbook
//! service: worker
//! version: 2
//! runtime: python
//! threadsafe: true
//! manual_scaling:
//!   instances: 2
//! grpc_api: true
//! ```
//!
//! `module` is accepted as an alias of `service`. Omitted names default to
//! `default`, omitted versions to `1`, and omitted runtimes to the
//! `--runtime` value.

use std::collections::BTreeSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use kiln_config::DEFAULT_MODULE;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const DEFAULT_VERSION: &str = "1";

/// Errors raised while loading application configuration.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// No configuration files were supplied.
    #[error("no application configuration files were given")]
    NoConfigFiles,
    /// A configuration file could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A configuration file is not valid YAML for a module.
    #[error("failed to parse '{path}': {message}")]
    Parse {
        /// File that could not be parsed.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// The version is neither a string nor a number.
    #[error("'{path}' declares an unsupported version: {value}")]
    InvalidVersion {
        /// File declaring the version.
        path: Utf8PathBuf,
        /// Declared value.
        value: String,
    },
    /// Two files declare the same module.
    #[error("module '{module}' is declared more than once")]
    DuplicateModule {
        /// Repeated module name.
        module: String,
    },
    /// Neither the files nor the command line name the application.
    #[error("no application id was given; set 'application' or pass --application")]
    MissingAppId,
}

/// One declared module before any command-line override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfiguration {
    /// Module name, unique within the application.
    pub name: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Default version served.
    pub version: String,
    /// Declared threadsafe flag.
    pub threadsafe: bool,
    /// Instance count for manually scaled modules.
    pub instances: Option<u32>,
    /// Whether the module needs the gRPC API service.
    pub grpc_api: bool,
}

/// Read-only view of the declared modules.
pub trait ModuleCatalog: Send + Sync {
    /// Application id.
    fn app_id(&self) -> &str;

    /// Declared modules in file order.
    fn modules(&self) -> &[ModuleConfiguration];

    /// Declared module names in file order.
    fn module_names(&self) -> Vec<String> {
        self.modules()
            .iter()
            .map(|module| module.name.clone())
            .collect()
    }

    /// Runtime of `module`, if declared.
    fn runtime_of(&self, module: &str) -> Option<&str> {
        self.modules()
            .iter()
            .find(|declared| declared.name == module)
            .map(|declared| declared.runtime.as_str())
    }

    /// Distinct runtimes in use.
    fn runtimes(&self) -> BTreeSet<&str> {
        self.modules()
            .iter()
            .map(|module| module.runtime.as_str())
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ManualScaling {
    instances: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ModuleFile {
    application: Option<String>,
    module: Option<String>,
    service: Option<String>,
    version: Option<Value>,
    runtime: Option<String>,
    threadsafe: Option<bool>,
    manual_scaling: Option<ManualScaling>,
    #[serde(default)]
    grpc_api: bool,
}

/// Modules declared by the application's configuration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfiguration {
    app_id: String,
    modules: Vec<ModuleConfiguration>,
}

impl ApplicationConfiguration {
    /// Reads every file in `paths`, in order.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplicationError`] when a file cannot be read or parsed,
    /// when two files declare the same module, or when neither the override
    /// nor the first file supplies an application id.
    pub fn load(
        paths: &[Utf8PathBuf],
        app_id_override: Option<&str>,
        runtime_default: &str,
    ) -> Result<Self, ApplicationError> {
        if paths.is_empty() {
            return Err(ApplicationError::NoConfigFiles);
        }
        let mut declared_app_id = None;
        let mut modules: Vec<ModuleConfiguration> = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let file = read_module_file(path)?;
            if index == 0 {
                declared_app_id = file.application.clone().filter(|id| !id.is_empty());
            }
            let module = module_from_file(path, file, runtime_default)?;
            if modules.iter().any(|existing| existing.name == module.name) {
                return Err(ApplicationError::DuplicateModule {
                    module: module.name,
                });
            }
            modules.push(module);
        }
        let app_id = app_id_override
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .or(declared_app_id)
            .ok_or(ApplicationError::MissingAppId)?;
        Ok(Self { app_id, modules })
    }

    /// Builds a configuration directly from module declarations.
    #[must_use]
    pub fn new(app_id: impl Into<String>, modules: Vec<ModuleConfiguration>) -> Self {
        Self {
            app_id: app_id.into(),
            modules,
        }
    }
}

impl ModuleCatalog for ApplicationConfiguration {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    fn modules(&self) -> &[ModuleConfiguration] {
        &self.modules
    }
}

fn read_module_file(path: &Utf8Path) -> Result<ModuleFile, ApplicationError> {
    let raw = fs::read_to_string(path).map_err(|source| ApplicationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(ModuleFile::default());
    }
    serde_saphyr::from_str(&raw).map_err(|error| ApplicationError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

fn module_from_file(
    path: &Utf8Path,
    file: ModuleFile,
    runtime_default: &str,
) -> Result<ModuleConfiguration, ApplicationError> {
    let name = file
        .service
        .or(file.module)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_MODULE.to_owned());
    let version = match file.version {
        None => DEFAULT_VERSION.to_owned(),
        Some(Value::String(version)) => version,
        Some(Value::Number(version)) => version.to_string(),
        Some(other) => {
            return Err(ApplicationError::InvalidVersion {
                path: path.to_path_buf(),
                value: other.to_string(),
            });
        }
    };
    Ok(ModuleConfiguration {
        name,
        runtime: file
            .runtime
            .filter(|runtime| !runtime.is_empty())
            .unwrap_or_else(|| runtime_default.to_owned()),
        version,
        threadsafe: file.threadsafe.unwrap_or(false),
        instances: file.manual_scaling.and_then(|scaling| scaling.instances),
        grpc_api: file.grpc_api,
    })
}
