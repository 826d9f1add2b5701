//! Typed configuration records for the pluggable runtimes.
//!
//! Each builder is a pure function over [`Options`]. Path-valued settings are
//! made absolute against a caller-supplied base directory without touching
//! the filesystem, so a missing executable surfaces only when the runtime
//! that needs it starts.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::options::Options;

/// Settings for PHP runtime instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PhpConfig {
    /// Interpreter to launch.
    pub executable_path: Option<Utf8PathBuf>,
    /// Whether XDebug remote debugging is enabled.
    pub enable_debugger: bool,
    /// Runtime extension loaded into the interpreter.
    pub gae_extension_path: Option<Utf8PathBuf>,
    /// XDebug extension loaded when debugging.
    pub xdebug_extension_path: Option<Utf8PathBuf>,
}

/// Settings for Python runtime instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PythonConfig {
    /// Script run before each new instance serves requests.
    pub startup_script: Option<Utf8PathBuf>,
    /// Arguments exposed to the startup script.
    pub startup_args: Option<String>,
}

/// Settings for Java runtime instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct JavaConfig {
    /// Extra arguments for the `java` command, in order.
    pub jvm_args: Vec<String>,
}

/// Settings for Go runtime instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct GoConfig {
    /// Directory holding compiled packages.
    pub work_dir: Option<Utf8PathBuf>,
}

/// Settings for custom runtime instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomConfig {
    /// Command started per instance; `{port}` is replaced with its port.
    pub entrypoint: String,
    /// Runtime name assigned to modules that declare none.
    pub runtime: String,
}

/// Connection settings for the MySQL server backing simulated Cloud SQL.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CloudSqlConfig {
    /// Server host name.
    pub host: String,
    /// Server port; never zero.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Unix socket, preferred over host and port when set.
    pub socket: Option<Utf8PathBuf>,
}

/// Settings for VM runtime instances.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VmConfig {
    /// Whether runtime logs are forwarded.
    pub enable_logs: bool,
}

/// Every runtime configuration derived for one server run.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuntimeConfigs {
    /// PHP settings.
    pub php: PhpConfig,
    /// Python settings.
    pub python: PythonConfig,
    /// Java settings.
    pub java: JavaConfig,
    /// Go settings.
    pub go: GoConfig,
    /// Custom runtime settings.
    pub custom: CustomConfig,
    /// Cloud SQL settings.
    pub cloud_sql: CloudSqlConfig,
    /// VM settings.
    pub vm: VmConfig,
}

impl RuntimeConfigs {
    /// Builds every runtime configuration, resolving relative paths against `base`.
    #[must_use]
    pub fn from_options(options: &Options, base: &Utf8Path) -> Self {
        Self {
            php: php_config(options, base),
            python: python_config(options, base),
            java: java_config(options),
            go: go_config(options, base),
            custom: custom_config(options),
            cloud_sql: cloud_sql_config(options, base),
            vm: vm_config(options),
        }
    }
}

/// Builds the PHP configuration.
#[must_use]
pub fn php_config(options: &Options, base: &Utf8Path) -> PhpConfig {
    PhpConfig {
        executable_path: absolutise_opt(options.php_executable_path.as_deref(), base),
        enable_debugger: options.php_remote_debugging,
        gae_extension_path: absolutise_opt(options.php_extension_path.as_deref(), base),
        xdebug_extension_path: absolutise_opt(options.php_xdebug_extension_path.as_deref(), base),
    }
}

/// Builds the Python configuration.
///
/// Startup arguments are only meaningful to a startup script and are dropped
/// without one.
#[must_use]
pub fn python_config(options: &Options, base: &Utf8Path) -> PythonConfig {
    let Some(script) = options.python_startup_script.as_deref() else {
        return PythonConfig::default();
    };
    PythonConfig {
        startup_script: Some(absolutise(script, base)),
        startup_args: options.python_startup_args.clone(),
    }
}

/// Builds the Java configuration.
#[must_use]
pub fn java_config(options: &Options) -> JavaConfig {
    JavaConfig {
        jvm_args: options.jvm_flag.clone(),
    }
}

/// Builds the Go configuration.
#[must_use]
pub fn go_config(options: &Options, base: &Utf8Path) -> GoConfig {
    GoConfig {
        work_dir: absolutise_opt(options.go_work_dir.as_deref(), base),
    }
}

/// Builds the custom runtime configuration.
#[must_use]
pub fn custom_config(options: &Options) -> CustomConfig {
    CustomConfig {
        entrypoint: options.custom_entrypoint.clone(),
        runtime: options.effective_runtime().to_owned(),
    }
}

/// Builds the Cloud SQL configuration.
#[must_use]
pub fn cloud_sql_config(options: &Options, base: &Utf8Path) -> CloudSqlConfig {
    CloudSqlConfig {
        host: options.mysql_host.clone(),
        port: options.mysql_port,
        user: options.mysql_user.clone(),
        password: options.mysql_password.clone(),
        socket: absolutise_opt(options.mysql_socket.as_deref(), base),
    }
}

/// Builds the VM configuration.
#[must_use]
pub fn vm_config(options: &Options) -> VmConfig {
    VmConfig {
        enable_logs: options.enable_vm_logs,
    }
}

/// Joins `path` onto `base` unless it is already absolute.
///
/// `.` components are dropped and `..` removes the preceding component, never
/// climbing above the root.
#[must_use]
pub fn absolutise(path: &Utf8Path, base: &Utf8Path) -> Utf8PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut normalised = Utf8PathBuf::new();
    for component in joined.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if normalised.parent().is_some() {
                    normalised.pop();
                }
            }
            Utf8Component::Prefix(_) | Utf8Component::RootDir | Utf8Component::Normal(_) => {
                normalised.push(component);
            }
        }
    }
    normalised
}

fn absolutise_opt(path: Option<&Utf8Path>, base: &Utf8Path) -> Option<Utf8PathBuf> {
    path.map(|path| absolutise(path, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const BASE: &str = "/work/app";

    #[fixture]
    fn base() -> Utf8PathBuf {
        Utf8PathBuf::from(BASE)
    }

    fn options(extra: &[&str]) -> Options {
        let mut args = vec!["kilnd"];
        args.extend_from_slice(extra);
        args.push("app.yaml");
        Options::load_from_iter(args).expect("options should parse")
    }

    #[rstest]
    fn unset_options_produce_default_records(base: Utf8PathBuf) {
        let configs = RuntimeConfigs::from_options(&options(&[]), &base);
        assert_eq!(configs.php, PhpConfig::default());
        assert_eq!(configs.python, PythonConfig::default());
        assert_eq!(configs.java, JavaConfig::default());
        assert_eq!(configs.go, GoConfig::default());
        assert_eq!(configs.vm, VmConfig::default());
        assert_eq!(configs.cloud_sql.host, "localhost");
        assert_eq!(configs.cloud_sql.port, 3306);
        assert!(configs.cloud_sql.socket.is_none());
    }

    #[rstest]
    fn relative_paths_are_made_absolute(base: Utf8PathBuf) {
        let options = options(&[
            "--php-executable-path=bin/php-cgi",
            "--php-extension-path=/opt/ext/gae.so",
            "--go-work-dir=build",
            "--mysql-socket=run/mysql.sock",
        ]);
        let php = php_config(&options, &base);
        assert_eq!(
            php.executable_path,
            Some(Utf8PathBuf::from("/work/app/bin/php-cgi"))
        );
        assert_eq!(
            php.gae_extension_path,
            Some(Utf8PathBuf::from("/opt/ext/gae.so"))
        );
        assert_eq!(
            go_config(&options, &base).work_dir,
            Some(Utf8PathBuf::from("/work/app/build"))
        );
        assert_eq!(
            cloud_sql_config(&options, &base).socket,
            Some(Utf8PathBuf::from("/work/app/run/mysql.sock"))
        );
    }

    #[rstest]
    #[case("../bin/./php", "/work/bin/php")]
    #[case("./startup.py", "/work/app/startup.py")]
    #[case("/opt/../usr/bin/php", "/usr/bin/php")]
    #[case("../../../../php", "/php")]
    fn absolutise_normalises_dot_components(
        base: Utf8PathBuf,
        #[case] path: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(
            absolutise(Utf8Path::new(path), &base),
            Utf8PathBuf::from(expected)
        );
    }

    #[rstest]
    fn python_args_need_a_script(base: Utf8PathBuf) {
        let without_script = options(&["--python-startup-args=--verbose"]);
        assert_eq!(python_config(&without_script, &base), PythonConfig::default());

        let with_script = options(&[
            "--python-startup-script=startup.py",
            "--python-startup-args=--verbose",
        ]);
        assert_eq!(
            python_config(&with_script, &base),
            PythonConfig {
                startup_script: Some(Utf8PathBuf::from("/work/app/startup.py")),
                startup_args: Some("--verbose".to_owned()),
            }
        );
    }

    #[test]
    fn custom_runtime_uses_effective_runtime() {
        let options = options(&["--runtime=python-compat", "--custom-entrypoint=serve {port}"]);
        assert_eq!(
            custom_config(&options),
            CustomConfig {
                entrypoint: "serve {port}".to_owned(),
                runtime: "vm".to_owned(),
            }
        );
    }

    #[test]
    fn flags_are_copied_verbatim() {
        let options = options(&[
            "--php-remote-debugging=yes",
            "--enable-vm-logs",
            "--jvm-flag=-Xmx1024m",
        ]);
        assert!(php_config(&options, Utf8Path::new(BASE)).enable_debugger);
        assert!(vm_config(&options).enable_logs);
        assert_eq!(java_config(&options).jvm_args, vec!["-Xmx1024m"]);
    }
}
