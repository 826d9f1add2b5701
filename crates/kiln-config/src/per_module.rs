//! Parsing for options that may be set once for every module or per module.
//!
//! A raw option takes one of two shapes:
//!
//! 1. A universal value such as `5`, which applies to every module.
//! 2. A comma-separated list of `module:value` pairs such as
//!    `default:5,backend:3`. An empty module name (`:5`) stands for the
//!    [`DEFAULT_MODULE`], matching how an app.yaml without a `module` key
//!    declares the default module.
//!
//! Resolution is pure: it either returns a complete [`ResolvedOption`] or
//! fails before returning anything.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::values::parse_bool;

/// Module name used when a per-module entry omits the module.
pub const DEFAULT_MODULE: &str = "default";

const MODULE_DELIMITER: char = ':';
const ENTRY_SEPARATOR: char = ',';

/// Result of resolving a raw per-module option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOption<T> {
    /// One value applied uniformly to every module.
    Single(T),
    /// Explicit values keyed by module name.
    PerModule(BTreeMap<String, T>),
}

impl<T> ResolvedOption<T> {
    /// Converts the contained values while preserving the shape.
    pub fn map<U>(self, mut convert: impl FnMut(T) -> U) -> ResolvedOption<U> {
        match self {
            Self::Single(value) => ResolvedOption::Single(convert(value)),
            Self::PerModule(values) => ResolvedOption::PerModule(
                values
                    .into_iter()
                    .map(|(module, value)| (module, convert(value)))
                    .collect(),
            ),
        }
    }
}

/// Human-facing wording for the errors raised by one option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionMessages {
    /// Prefix for an unparsable universal value, e.g. `Invalid max instance count`.
    pub invalid_value: &'static str,
    /// Expected shape of a per-module entry, e.g. `module:max_instance_count`.
    pub entry_format: &'static str,
    /// Subject of predicate failures, e.g. `Max instance count`.
    pub predicate_subject: &'static str,
    /// Requirement stated on predicate failure, e.g. `must be greater than zero`.
    pub requirement: &'static str,
    /// Prefix for repeated module names, e.g. `Duplicate max instance count`.
    pub duplicate: &'static str,
}

impl OptionMessages {
    fn invalid_value(&self, value: &str) -> OptionError {
        OptionError::InvalidValue {
            value: value.to_owned(),
            message: format!("{}: {value:?}", self.invalid_value),
        }
    }

    fn invalid_predicate(&self, module: Option<&str>) -> OptionError {
        let message = match module {
            Some(module) => format!(
                "{} for module {module} {}",
                self.predicate_subject, self.requirement
            ),
            None => format!("{} {}", self.predicate_subject, self.requirement),
        };
        OptionError::InvalidPredicate {
            module: module.map(str::to_owned),
            message,
        }
    }

    fn malformed_entry(&self, entry: &str) -> OptionError {
        OptionError::MalformedEntry {
            entry: entry.to_owned(),
            message: format!("Expected \"{}\": {entry:?}", self.entry_format),
        }
    }

    fn duplicate_module(&self, module: &str) -> OptionError {
        OptionError::DuplicateModule {
            module: module.to_owned(),
            message: format!("{} for module {module}", self.duplicate),
        }
    }
}

/// Wording used by [`parse_max_module_instances`].
pub const MAX_MODULE_INSTANCES_MESSAGES: OptionMessages = OptionMessages {
    invalid_value: "Invalid max instance count",
    entry_format: "module:max_instance_count",
    predicate_subject: "Max instance count",
    requirement: "must be greater than zero",
    duplicate: "Duplicate max instance count",
};

/// Wording used by [`parse_threadsafe_override`].
pub const THREADSAFE_OVERRIDE_MESSAGES: OptionMessages = OptionMessages {
    invalid_value: "Invalid threadsafe override",
    entry_format: "module:threadsafe_override",
    predicate_subject: "Threadsafe override",
    requirement: "is not valid",
    duplicate: "Duplicate threadsafe override value",
};

/// Errors raised while resolving a per-module option.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    /// A universal value could not be parsed.
    #[error("{message}")]
    InvalidValue {
        /// The raw value that failed to parse.
        value: String,
        /// Rendered diagnostic.
        message: String,
    },
    /// A parsed value was rejected by the option's predicate.
    #[error("{message}")]
    InvalidPredicate {
        /// Module the value belonged to, absent for universal values.
        module: Option<String>,
        /// Rendered diagnostic.
        message: String,
    },
    /// A per-module entry was not of the form `module:value`.
    #[error("{message}")]
    MalformedEntry {
        /// The offending `module:value` token.
        entry: String,
        /// Rendered diagnostic.
        message: String,
    },
    /// The same module appeared more than once.
    #[error("{message}")]
    DuplicateModule {
        /// Module name after defaulting.
        module: String,
        /// Rendered diagnostic.
        message: String,
    },
}

/// Resolves `raw` into a universal value or a per-module mapping.
///
/// `parse` converts the textual value and `validate` checks the converted
/// value. Entries are processed left to right and the first failure is
/// returned; a duplicate module is reported before its value is validated.
pub fn resolve_per_module_option<T, E>(
    raw: &str,
    parse: impl Fn(&str) -> Result<T, E>,
    validate: impl Fn(&T) -> bool,
    messages: &OptionMessages,
) -> Result<ResolvedOption<T>, OptionError> {
    if !raw.contains(MODULE_DELIMITER) {
        let value = parse(raw.trim()).map_err(|_| messages.invalid_value(raw))?;
        if !validate(&value) {
            return Err(messages.invalid_predicate(None));
        }
        return Ok(ResolvedOption::Single(value));
    }

    let mut module_to_value = BTreeMap::new();
    for entry in raw.split(ENTRY_SEPARATOR) {
        let (module, text) = split_entry(entry).ok_or_else(|| messages.malformed_entry(entry))?;
        let value = parse(text.trim()).map_err(|_| messages.malformed_entry(entry))?;
        let module = match module.trim() {
            "" => DEFAULT_MODULE,
            name => name,
        };
        if module_to_value.contains_key(module) {
            return Err(messages.duplicate_module(module));
        }
        if !validate(&value) {
            return Err(messages.invalid_predicate(Some(module)));
        }
        module_to_value.insert(module.to_owned(), value);
    }
    Ok(ResolvedOption::PerModule(module_to_value))
}

fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let (module, value) = entry.split_once(MODULE_DELIMITER)?;
    if value.contains(MODULE_DELIMITER) {
        return None;
    }
    Some((module, value))
}

/// Parses the `--max-module-instances` option.
///
/// Counts must be positive integers that fit in a `u32`.
///
/// ```text
/// "5"                   -> Single(5)
/// "default:3,backend:20" -> PerModule({default: 3, backend: 20})
/// ":3"                  -> PerModule({default: 3})
/// ```
pub fn parse_max_module_instances(raw: &str) -> Result<ResolvedOption<u32>, OptionError> {
    let resolved = resolve_per_module_option(
        raw,
        str::parse::<i64>,
        |count| (1..=i64::from(u32::MAX)).contains(count),
        &MAX_MODULE_INSTANCES_MESSAGES,
    )?;
    Ok(resolved.map(|count| u32::try_from(count).unwrap_or(u32::MAX)))
}

/// Parses the `--threadsafe-override` option.
///
/// Values use the boolean vocabulary accepted by
/// [`parse_bool`](crate::parse_bool); every parsed value is valid.
pub fn parse_threadsafe_override(raw: &str) -> Result<ResolvedOption<bool>, OptionError> {
    resolve_per_module_option(raw, parse_bool, |_| true, &THREADSAFE_OVERRIDE_MESSAGES)
}
