//! Local development server orchestrator.
//!
//! `kilnd` serves an application made of one or more modules. It resolves
//! command-line options that may be set globally or per module, loads the
//! modules declared by the application's YAML files, and starts a fixed set
//! of services in dependency order: the API service, the gRPC API service
//! when any module needs it, the dispatcher that fronts every module, and the
//! admin service. The [`ServiceSupervisor`] records each service as it
//! starts so that teardown, whether after a termination signal or a failed
//! startup, stops exactly what is running in reverse order.
//!
//! Lifecycle events are reported through a [`HealthReporter`], which by
//! default emits structured `tracing` events, and usage is collected by an
//! explicitly constructed [`UsageMetrics`] context.

mod application;
mod dispatcher;
mod health;
mod local_dispatcher;
mod metrics;
mod process;
mod services;
mod settings;
mod supervisor;
mod telemetry;
mod transport;

pub use application::{
    ApplicationConfiguration, ApplicationError, ModuleCatalog, ModuleConfiguration,
};
pub use dispatcher::{Dispatcher, DispatcherError, DispatcherPlan, ModulePlan, ModuleSummary};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use local_dispatcher::LocalDispatcher;
pub use metrics::{
    ADMIN_CONSOLE_CATEGORY, API_STUB_USAGE_CATEGORY, DEVSERVER_CATEGORY, ERROR_ACTION,
    MetricsEndpoint, MetricsEvent, MetricsSink, START_ACTION, STOP_ACTION, TracingMetricsSink,
    UsageMetrics,
};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_server};
pub use services::{
    AdminService, AdminServiceConfig, ApiService, ApiServiceConfig, AuxiliaryService,
    GrpcApiService, GrpcApiServiceConfig, Interceptor, LocalServiceFactory, ServiceFactory,
    ServiceKind, ServiceStartError, ServiceStopError, UsageMetricsInterceptor,
};
pub use settings::effective_settings_for;
pub use supervisor::{ServiceSupervisor, SupervisorConfig, SupervisorError, SupervisorState};
pub use telemetry::{TelemetryError, TelemetryHandle, TelemetrySettings};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
