//! Scalar value parsers shared by the command-line options.

use std::env::{self, VarError};

use camino::Utf8PathBuf;
use thiserror::Error;

/// Tokens accepted as `true` by [`parse_bool`], compared case-insensitively.
pub const TRUE_TOKENS: &[&str] = &["true", "yes", "y", "on", "1"];

/// Tokens accepted as `false` by [`parse_bool`], compared case-insensitively.
pub const FALSE_TOKENS: &[&str] = &["false", "no", "n", "off", "0"];

/// Error returned when a boolean token is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid boolean value: {0:?}")]
pub struct BooleanParseError(String);

/// Parses a boolean from the vocabulary in [`TRUE_TOKENS`] and [`FALSE_TOKENS`].
pub fn parse_bool(value: &str) -> Result<bool, BooleanParseError> {
    let token = value.trim().to_ascii_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Ok(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(BooleanParseError(value.to_owned()))
    }
}

/// Errors raised when a port number is out of range or not an integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// The value was not an integer.
    #[error("Invalid port: {0:?}")]
    NotAnInteger(String),
    /// The integer fell outside the accepted range.
    #[error("Invalid port: {0}")]
    OutOfRange(i64),
}

/// Parser for integers that represent TCP ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortParser {
    allow_zero: bool,
}

impl PortParser {
    /// Accepts `0` (an ephemeral port) through `65535`.
    #[must_use]
    pub const fn new() -> Self {
        Self { allow_zero: true }
    }

    /// Accepts `1` through `65535`.
    #[must_use]
    pub const fn non_zero() -> Self {
        Self { allow_zero: false }
    }

    /// Parses `value` into a port.
    pub fn parse(self, value: &str) -> Result<u16, PortError> {
        let port = value
            .trim()
            .parse::<i64>()
            .map_err(|_| PortError::NotAnInteger(value.to_owned()))?;
        let minimum = i64::from(!self.allow_zero);
        if port < minimum {
            return Err(PortError::OutOfRange(port));
        }
        u16::try_from(port).map_err(|_| PortError::OutOfRange(port))
    }
}

impl Default for PortParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `clap` value parser for ports that may be zero.
pub fn parse_port(value: &str) -> Result<u16, PortError> {
    PortParser::new().parse(value)
}

/// `clap` value parser for ports that must be non-zero.
pub fn parse_non_zero_port(value: &str) -> Result<u16, PortError> {
    PortParser::non_zero().parse(value)
}

/// Error returned when a path references a variable that cannot be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot expand {path:?}: {message}")]
pub struct PathExpansionError {
    path: String,
    message: String,
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references in a path.
///
/// Unset variables are left untouched, as are `~user` forms. A variable whose
/// value is not valid Unicode is an error.
///
/// # Errors
///
/// Returns [`PathExpansionError`] when a referenced variable cannot be read.
pub fn expand_path(value: &str) -> Result<Utf8PathBuf, PathExpansionError> {
    shellexpand::full_with_context(value, home_dir, |name| match env::var(name) {
        Ok(resolved) => Ok(Some(resolved)),
        Err(VarError::NotPresent) => Ok(None),
        Err(error) => Err(error),
    })
    .map(|expanded| Utf8PathBuf::from(expanded.into_owned()))
    .map_err(|error| PathExpansionError {
        path: value.to_owned(),
        message: error.to_string(),
    })
}

fn home_dir() -> Option<String> {
    dirs::home_dir().and_then(|home| home.into_os_string().into_string().ok())
}

/// Error returned when an `--env-var` value lacks the `=` separator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected KEY=VALUE, got {0:?}")]
pub struct EnvVarParseError(String);

/// Splits `KEY=VALUE` on the first `=`.
pub fn parse_env_var(value: &str) -> Result<(String, String), EnvVarParseError> {
    match value.split_once('=') {
        Some((key, assigned)) if !key.is_empty() => Ok((key.to_owned(), assigned.to_owned())),
        _ => Err(EnvVarParseError(value.to_owned())),
    }
}
