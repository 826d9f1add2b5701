//! Defines the unified error surface for server launch and supervision.

use std::io;

use thiserror::Error;

use crate::application::ApplicationError;
use crate::supervisor::SupervisorError;
use crate::telemetry::TelemetryError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the development server.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Telemetry could not be configured.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The working directory could not be resolved.
    #[error("failed to resolve working directory: {source}")]
    WorkingDirectory {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The working directory is not valid UTF-8.
    #[error("working directory '{path}' is not valid UTF-8")]
    NonUtf8WorkingDirectory {
        /// Lossy rendering of the directory.
        path: String,
    },
    /// The application configuration failed to load.
    #[error("failed to load application configuration: {source}")]
    Application {
        /// Underlying loader error.
        #[source]
        source: ApplicationError,
    },
    /// The supervisor failed to start.
    #[error("development server failed to start: {source}")]
    Supervisor {
        /// Underlying supervisor error.
        #[source]
        source: SupervisorError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<ApplicationError> for LaunchError {
    fn from(source: ApplicationError) -> Self {
        Self::Application { source }
    }
}

impl From<SupervisorError> for LaunchError {
    fn from(source: SupervisorError) -> Self {
        Self::Supervisor { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
