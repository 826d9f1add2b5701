//! Maps resolved per-module options onto the modules an application declares.

use std::collections::BTreeMap;

use kiln_config::ResolvedOption;
use tracing::warn;

const SETTINGS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::settings");

/// Effective value of an option for every declared module it applies to.
///
/// A single value applies to every module in `declared`. Per-module entries
/// naming a module the application does not declare are dropped with a
/// warning, so the keys of the result are always declared module names. An
/// unset option yields an empty map.
#[must_use]
pub fn effective_settings_for<T: Clone>(
    resolved: Option<&ResolvedOption<T>>,
    declared: &[String],
    option_name: &str,
) -> BTreeMap<String, T> {
    match resolved {
        None => BTreeMap::new(),
        Some(ResolvedOption::Single(value)) => declared
            .iter()
            .map(|module| (module.clone(), value.clone()))
            .collect(),
        Some(ResolvedOption::PerModule(per_module)) => per_module
            .iter()
            .filter_map(|(module, value)| {
                if declared.contains(module) {
                    Some((module.clone(), value.clone()))
                } else {
                    warn!(
                        target: SETTINGS_TARGET,
                        module = module.as_str(),
                        option = option_name,
                        "Unknown module {module} for {option_name}"
                    );
                    None
                }
            })
            .collect(),
    }
}
