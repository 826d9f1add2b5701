//! Command-line surface of the development server.
//!
//! Options are grouped the way they are documented in `--help`. Per-module
//! options, ports, booleans, and paths are parsed by the dedicated value
//! parsers so every resolution error is reported by `clap` before any
//! service starts.

use std::collections::BTreeMap;
use std::ffi::OsString;

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};

use crate::defaults::{
    DEFAULT_ADMIN_PORT, DEFAULT_AUTH_DOMAIN, DEFAULT_MYSQL_PORT, DEFAULT_PORT, LOCAL_HOST,
    default_server_host,
};
use crate::logging::{LogFormat, LogLevel};
use crate::per_module::{ResolvedOption, parse_max_module_instances, parse_threadsafe_override};
use crate::values::{expand_path, parse_bool, parse_env_var, parse_non_zero_port, parse_port};

/// Runtime name that is served by the VM runtime.
const PYTHON_COMPAT_RUNTIME: &str = "python-compat";
const VM_RUNTIME: &str = "vm";

/// Options bundle for one development server run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kilnd",
    about = "Runs a multi-module application locally with its supporting services"
)]
pub struct Options {
    /// Path to one or more app.yaml files.
    #[arg(value_name = "YAML_PATH", required = true, num_args = 1.., value_parser = expand_path)]
    pub config_paths: Vec<Utf8PathBuf>,

    /// Application id, overriding the value from the app.yaml file.
    #[arg(short = 'A', long = "application", help_heading = "Common")]
    pub app_id: Option<String>,
    /// Host name to which application modules should bind.
    #[arg(long, default_value_t = default_server_host(), help_heading = "Common")]
    pub host: String,
    /// Lowest port to which application modules should bind.
    #[arg(long, default_value_t = DEFAULT_PORT, value_parser = parse_port, help_heading = "Common")]
    pub port: u16,
    /// Host name to which the admin service should bind.
    #[arg(long, default_value_t = default_server_host(), help_heading = "Common")]
    pub admin_host: String,
    /// Port to which the admin service should bind.
    #[arg(
        long,
        default_value_t = DEFAULT_ADMIN_PORT,
        value_parser = parse_port,
        help_heading = "Common"
    )]
    pub admin_port: u16,
    /// Name of the authorisation domain to use.
    #[arg(long, default_value = DEFAULT_AUTH_DOMAIN, help_heading = "Common")]
    pub auth_domain: String,
    /// Path to the data associated with the application.
    #[arg(long, value_name = "PATH", value_parser = expand_path, help_heading = "Common")]
    pub storage_path: Option<Utf8PathBuf>,
    /// Level below which application log messages are not displayed.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, help_heading = "Common")]
    pub log_level: LogLevel,
    /// Maximum runtime instances per module: a count for every module or
    /// a comma-separated list of module:count, e.g. "default:5,backend:3".
    #[arg(long, value_parser = parse_max_module_instances, help_heading = "Common")]
    pub max_module_instances: Option<ResolvedOption<u32>>,
    /// Poll modification times to detect source changes.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_bool,
        help_heading = "Common"
    )]
    pub use_mtime_file_watcher: bool,
    /// Override the declared threadsafe setting: a boolean for every module
    /// or a comma-separated list of module:boolean, e.g. "default:no,backend:yes".
    #[arg(long, value_parser = parse_threadsafe_override, help_heading = "Common")]
    pub threadsafe_override: Option<ResolvedOption<bool>>,
    /// Forward VM runtime logs.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_bool,
        hide = true
    )]
    pub enable_vm_logs: bool,

    /// Path to the PHP executable.
    #[arg(long, value_name = "PATH", value_parser = expand_path, help_heading = "PHP")]
    pub php_executable_path: Option<Utf8PathBuf>,
    /// Enable XDebug remote debugging.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_bool,
        help_heading = "PHP"
    )]
    pub php_remote_debugging: bool,
    /// Path to the runtime's PHP extension.
    #[arg(long, value_name = "PATH", value_parser = expand_path, help_heading = "PHP")]
    pub php_extension_path: Option<Utf8PathBuf>,
    /// Path to the xdebug extension.
    #[arg(long, value_name = "PATH", value_parser = expand_path, help_heading = "PHP")]
    pub php_xdebug_extension_path: Option<Utf8PathBuf>,

    /// Script run at the startup of new Python runtime instances.
    #[arg(long, value_name = "PATH", value_parser = expand_path, help_heading = "Python")]
    pub python_startup_script: Option<Utf8PathBuf>,
    /// Arguments made available to the startup script.
    #[arg(long, help_heading = "Python")]
    pub python_startup_args: Option<String>,

    /// Additional argument for the java command; may be repeated.
    #[arg(long, allow_hyphen_values = true, help_heading = "Java")]
    pub jvm_flag: Vec<String>,

    /// Working directory for compiled Go packages.
    #[arg(long, value_name = "PATH", value_parser = expand_path, help_heading = "Go")]
    pub go_work_dir: Option<Utf8PathBuf>,

    /// Entrypoint for custom runtime modules; "{port}" is replaced with the
    /// instance port.
    #[arg(long, default_value = "", help_heading = "Custom Runtime")]
    pub custom_entrypoint: String,
    /// Default runtime for modules that do not declare one.
    #[arg(long, default_value = "", help_heading = "Custom Runtime")]
    pub runtime: String,

    /// Host name of the MySQL server used for simulated Cloud SQL.
    #[arg(long, default_value = LOCAL_HOST, help_heading = "Cloud SQL")]
    pub mysql_host: String,
    /// Port of the MySQL server used for simulated Cloud SQL.
    #[arg(
        long,
        default_value_t = DEFAULT_MYSQL_PORT,
        value_parser = parse_non_zero_port,
        help_heading = "Cloud SQL"
    )]
    pub mysql_port: u16,
    /// MySQL user name.
    #[arg(long, default_value = "", help_heading = "Cloud SQL")]
    pub mysql_user: String,
    /// MySQL password.
    #[arg(long, default_value = "", help_heading = "Cloud SQL")]
    pub mysql_password: String,
    /// Unix socket of the MySQL server.
    #[arg(long, value_name = "PATH", value_parser = expand_path, help_heading = "Cloud SQL")]
    pub mysql_socket: Option<Utf8PathBuf>,

    /// Make files listed as skipped or static readable by the application.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_bool,
        help_heading = "Miscellaneous"
    )]
    pub allow_skipped_files: bool,
    /// Host name to which the API service should bind.
    #[arg(long, default_value_t = default_server_host(), hide = true)]
    pub api_host: String,
    /// Port to which the API service should bind.
    #[arg(long, default_value_t = 0, value_parser = parse_port, help_heading = "Miscellaneous")]
    pub api_port: u16,
    /// API that talks gRPC to the API service; may be repeated, "all" for every API.
    #[arg(long = "grpc-api", help_heading = "Miscellaneous")]
    pub grpc_apis: Vec<String>,
    /// Port to which the gRPC API service should bind.
    #[arg(long, default_value_t = 0, value_parser = parse_port, help_heading = "Miscellaneous")]
    pub grpc_api_port: u16,
    /// Restart instances when files relevant to their module change.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "true",
        default_missing_value = "true",
        value_parser = parse_bool,
        help_heading = "Miscellaneous"
    )]
    pub automatic_restart: bool,
    /// Level below which the server's own log messages are not displayed.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, help_heading = "Miscellaneous")]
    pub server_log_level: LogLevel,
    /// Raw tracing filter expression; overrides --server-log-level.
    #[arg(long, help_heading = "Miscellaneous")]
    pub log_filter: Option<String>,
    /// Output format for the server's own logs.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, help_heading = "Miscellaneous")]
    pub log_format: LogFormat,
    /// Environment variable for the runtimes in KEY=VALUE form; may be repeated.
    #[arg(long = "env-var", value_parser = parse_env_var, help_heading = "Miscellaneous")]
    pub env_variables: Vec<(String, String)>,
    /// Client id for usage metrics; metrics are disabled when unset.
    #[arg(long, help_heading = "Miscellaneous")]
    pub metrics_client_id: Option<String>,
    /// User agent reported with usage metrics.
    #[arg(long, help_heading = "Miscellaneous")]
    pub metrics_user_agent: Option<String>,
}

impl Options {
    /// Parses options from an argument iterator whose first item is the
    /// program name.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// Default runtime after mapping aliases served by another runtime.
    #[must_use]
    pub fn effective_runtime(&self) -> &str {
        if self.runtime == PYTHON_COMPAT_RUNTIME {
            VM_RUNTIME
        } else {
            self.runtime.as_str()
        }
    }

    /// Filter expression for the server's own telemetry.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .unwrap_or_else(|| self.server_log_level.filter_directive())
    }

    /// User-defined environment for the runtimes; later duplicates win.
    #[must_use]
    pub fn env_variables(&self) -> BTreeMap<String, String> {
        self.env_variables.iter().cloned().collect()
    }

    /// Whether the gRPC API service was requested on the command line.
    #[must_use]
    pub fn grpc_api_requested(&self) -> bool {
        !self.grpc_apis.is_empty()
    }
}
