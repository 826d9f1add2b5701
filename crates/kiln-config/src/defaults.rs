use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use libc::geteuid;

/// Environment variable whose presence marks a hosted developer shell.
pub const DEVSHELL_ENV: &str = "DEVSHELL_CLIENT_PORT";

/// Lowest port to which application modules bind.
pub const DEFAULT_PORT: u16 = 8080;

/// Port to which the admin service binds.
pub const DEFAULT_ADMIN_PORT: u16 = 8000;

/// Port of the MySQL server used for simulated Cloud SQL.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Authorisation domain reported to applications.
pub const DEFAULT_AUTH_DOMAIN: &str = "example.com";

/// Host every server binds to unless a developer shell is detected.
pub const LOCAL_HOST: &str = "localhost";

/// Host used inside a developer shell so the proxy can reach the servers.
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// Default bind host for modules, the admin service, and the API service.
#[must_use]
pub fn default_server_host() -> String {
    if env::var_os(DEVSHELL_ENV).is_some() {
        ALL_INTERFACES.to_owned()
    } else {
        LOCAL_HOST.to_owned()
    }
}

/// Base directory for per-user scratch data such as the default storage path.
pub(crate) fn temp_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

/// Identifier separating concurrent users sharing a temporary directory.
#[cfg(unix)]
pub(crate) fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
pub(crate) fn user_namespace() -> String {
    env::var("USERNAME").unwrap_or_else(|_| "user".to_owned())
}
