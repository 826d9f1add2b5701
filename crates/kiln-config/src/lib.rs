//! Option parsing and configuration resolution for the kiln development
//! server.
//!
//! The crate turns command-line input into typed values before anything is
//! started:
//!
//! - [`Options`] is the full `clap` surface. Every value parser runs at parse
//!   time, so a bad port or per-module entry aborts the run before any
//!   listener is bound.
//! - [`resolve_per_module_option`] implements the "one value for every module,
//!   or `module:value` pairs" format used by `--max-module-instances` and
//!   `--threadsafe-override`, producing a [`ResolvedOption`].
//! - [`RuntimeConfigs`] collects the per-runtime records derived from the
//!   options, with paths made absolute.
//! - [`resolve_storage_path`] places emulated storage on disk.

mod backend;
mod defaults;
mod logging;
mod options;
mod per_module;
mod storage;
mod values;

pub use backend::{
    CloudSqlConfig, CustomConfig, GoConfig, JavaConfig, PhpConfig, PythonConfig, RuntimeConfigs,
    VmConfig, absolutise, cloud_sql_config, custom_config, go_config, java_config, php_config,
    python_config, vm_config,
};
pub use defaults::{
    ALL_INTERFACES, DEFAULT_ADMIN_PORT, DEFAULT_AUTH_DOMAIN, DEFAULT_MYSQL_PORT, DEFAULT_PORT,
    DEVSHELL_ENV, LOCAL_HOST, default_server_host,
};
pub use logging::{LogFormat, LogFormatParseError, LogLevel};
pub use options::Options;
pub use per_module::{
    DEFAULT_MODULE, MAX_MODULE_INSTANCES_MESSAGES, OptionError, OptionMessages, ResolvedOption,
    THREADSAFE_OVERRIDE_MESSAGES, parse_max_module_instances, parse_threadsafe_override,
    resolve_per_module_option,
};
pub use storage::{resolve_storage_path, xsrf_path};
pub use values::{
    BooleanParseError, EnvVarParseError, FALSE_TOKENS, PathExpansionError, PortError, PortParser,
    TRUE_TOKENS,
    expand_path, parse_bool, parse_env_var, parse_non_zero_port, parse_port,
};
