//! Derives the on-disk locations shared by the API and admin services.
//!
//! Emulated storage lives under a single directory per application. When
//! `--storage-path` is not supplied the directory is placed in the system
//! temporary directory and namespaced by application id and user so
//! concurrent servers for different apps or users do not collide.

use camino::{Utf8Path, Utf8PathBuf};

use crate::defaults::{temp_base_directory, user_namespace};

const XSRF_FILE_NAME: &str = "xsrf";

/// Returns the storage directory for `app_id`.
///
/// No directories are created; callers that write into the path own that.
#[must_use]
pub fn resolve_storage_path(explicit: Option<&Utf8Path>, app_id: &str) -> Utf8PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => temp_base_directory().join(format!("kiln.{app_id}.{}", user_namespace())),
    }
}

/// Location of the admin service's XSRF secret inside `storage_path`.
#[must_use]
pub fn xsrf_path(storage_path: &Utf8Path) -> Utf8PathBuf {
    storage_path.join(XSRF_FILE_NAME)
}
