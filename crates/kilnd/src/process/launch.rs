//! Sequences server launch, supervision, and shutdown.

use std::env;
use std::sync::Arc;

use camino::Utf8PathBuf;
use kiln_config::Options;
use tracing::info;

use crate::application::{ApplicationConfiguration, ModuleCatalog};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::metrics::{DEVSERVER_CATEGORY, ERROR_ACTION, TracingMetricsSink, UsageMetrics};
use crate::services::{LocalServiceFactory, ServiceFactory};
use crate::supervisor::{ServiceSupervisor, SupervisorConfig};
use crate::telemetry::{self, TelemetrySettings};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to run the development server.
pub(crate) struct LaunchPlan<S, F> {
    pub(crate) options: Options,
    pub(crate) working_dir: Utf8PathBuf,
    pub(crate) shutdown: S,
    pub(crate) factory: F,
    pub(crate) metrics: Arc<UsageMetrics>,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

/// Runs the development server using the production collaborators.
///
/// Blocks until a termination signal arrives, then tears everything down.
///
/// # Errors
///
/// Returns a [`LaunchError`] when telemetry, signal handling, application
/// loading, or startup fails. Services that did start are stopped first.
pub fn run_server(options: Options) -> Result<(), LaunchError> {
    telemetry::initialise(&TelemetrySettings::from_options(&options))?;
    let shutdown = SystemShutdownSignal::install()?;
    let working_dir = working_dir()?;
    let sink = Arc::new(TracingMetricsSink);
    let metrics = Arc::new(UsageMetrics::new(sink));
    let factory = LocalServiceFactory::new(Arc::clone(&metrics));
    let plan = LaunchPlan {
        options,
        working_dir,
        shutdown,
        factory,
        metrics,
        reporter: Arc::new(StructuredHealthReporter::new()),
    };
    run_server_with(plan)
}

/// Runs the development server with injected collaborators.
pub(crate) fn run_server_with<S, F>(plan: LaunchPlan<S, F>) -> Result<(), LaunchError>
where
    S: ShutdownSignal,
    F: ServiceFactory,
{
    let LaunchPlan {
        options,
        working_dir,
        mut shutdown,
        factory,
        metrics,
        reporter,
    } = plan;

    info!(
        target: PROCESS_TARGET,
        config_files = options.config_paths.len(),
        "starting development server"
    );
    let application = ApplicationConfiguration::load(
        &options.config_paths,
        options.app_id.as_deref(),
        options.effective_runtime(),
    )?;
    metrics.init(
        options.metrics_client_id.as_deref(),
        options.metrics_user_agent.as_deref(),
        application.runtimes(),
    );

    let config = SupervisorConfig::from_options(&options, application.app_id(), &working_dir);
    let catalog: Arc<dyn ModuleCatalog> = Arc::new(application);
    let mut supervisor = ServiceSupervisor::new(config, catalog, factory, reporter);

    let outcome = serve(&mut supervisor, &mut shutdown);
    if let Err(error) = &outcome {
        let details = error.to_string();
        metrics.log_once_on_stop(DEVSERVER_CATEGORY, ERROR_ACTION, Some(&details), None);
    }
    supervisor.stop();
    metrics.shutdown();
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    outcome
}

fn serve<S, F>(supervisor: &mut ServiceSupervisor<F>, shutdown: &mut S) -> Result<(), LaunchError>
where
    S: ShutdownSignal,
    F: ServiceFactory,
{
    supervisor.start()?;
    shutdown.wait()?;
    Ok(())
}

fn working_dir() -> Result<Utf8PathBuf, LaunchError> {
    let path = env::current_dir().map_err(|source| LaunchError::WorkingDirectory { source })?;
    Utf8PathBuf::from_path_buf(path).map_err(|path| LaunchError::NonUtf8WorkingDirectory {
        path: path.to_string_lossy().into_owned(),
    })
}
