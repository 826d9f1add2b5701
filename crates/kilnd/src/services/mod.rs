//! Auxiliary services started alongside the dispatcher.
//!
//! The supervisor creates services through a [`ServiceFactory`] so tests can
//! substitute recording doubles, then drives them through the
//! [`AuxiliaryService`] lifecycle.

mod admin;
mod api;
mod grpc_api;

use std::fmt;
use std::sync::Arc;

use axum::Router;
use camino::Utf8PathBuf;
use thiserror::Error;

use crate::dispatcher::{Dispatcher, DispatcherPlan, ModuleSummary};
use crate::local_dispatcher::LocalDispatcher;
use crate::metrics::UsageMetrics;
use crate::transport::{ListenerHandle, SocketListener};

pub use admin::{AdminService, Interceptor, UsageMetricsInterceptor};
pub use api::ApiService;
pub use grpc_api::GrpcApiService;

/// Auxiliary services managed by the supervisor, in start order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// The primary API emulation service.
    Api,
    /// The secondary gRPC API emulation service.
    GrpcApi,
    /// The admin service.
    Admin,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Api => "api",
            Self::GrpcApi => "grpc_api",
            Self::Admin => "admin",
        };
        formatter.write_str(label)
    }
}

/// Errors surfaced when a service fails to start.
#[derive(Debug, Error)]
#[error("{kind} service failed to start: {message}")]
pub struct ServiceStartError {
    /// Service that failed.
    pub kind: ServiceKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceStartError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(kind: ServiceKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        kind: ServiceKind,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable message describing the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Errors surfaced when a service fails to stop cleanly.
#[derive(Debug, Error)]
#[error("{kind} service failed to stop: {message}")]
pub struct ServiceStopError {
    /// Service that failed.
    pub kind: ServiceKind,
    message: String,
}

impl ServiceStopError {
    /// Builds a stop error.
    #[must_use]
    pub fn new(kind: ServiceKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A supporting service with a start/stop lifecycle and a bound port.
///
/// A service whose `start` fails must release anything it bound before
/// returning, since the supervisor only tears down services that started.
pub trait AuxiliaryService: Send {
    /// Which service this is.
    fn kind(&self) -> ServiceKind;

    /// Binds and begins serving; returns once the port is bound.
    fn start(&mut self) -> Result<(), ServiceStartError>;

    /// Stops serving.
    fn quit(&mut self) -> Result<(), ServiceStopError>;

    /// Bound port once started, the configured port before.
    fn port(&self) -> u16;

    /// Records the address that balances across the default module.
    fn set_balanced_address(&mut self, address: &str) {
        let _ = address;
    }
}

/// Settings for the primary API service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServiceConfig {
    /// Bind host.
    pub host: String,
    /// Bind port; `0` for ephemeral.
    pub port: u16,
    /// Application id.
    pub app_id: String,
    /// Emulated storage directory.
    pub storage_path: Utf8PathBuf,
}

/// Settings for the secondary gRPC API service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcApiServiceConfig {
    /// Bind host.
    pub host: String,
    /// Bind port; `0` for ephemeral.
    pub port: u16,
    /// APIs served over gRPC.
    pub apis: Vec<String>,
}

/// Settings for the admin service, available once the dispatcher runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminServiceConfig {
    /// Bind host.
    pub host: String,
    /// Bind port; `0` for ephemeral.
    pub port: u16,
    /// Application id.
    pub app_id: String,
    /// File holding the XSRF secret.
    pub xsrf_path: Utf8PathBuf,
    /// Address of the dispatcher.
    pub dispatch_address: String,
    /// Modules as served by the dispatcher.
    pub modules: Vec<ModuleSummary>,
}

/// Creates the dispatcher and auxiliary services for a supervisor.
pub trait ServiceFactory {
    /// Builds the dispatcher without starting it.
    fn dispatcher(&self, plan: DispatcherPlan) -> Box<dyn Dispatcher>;

    /// Builds the primary API service.
    fn api_service(&self, config: ApiServiceConfig) -> Box<dyn AuxiliaryService>;

    /// Builds the secondary gRPC API service.
    fn grpc_api_service(&self, config: GrpcApiServiceConfig) -> Box<dyn AuxiliaryService>;

    /// Builds the admin service.
    fn admin_service(&self, config: AdminServiceConfig) -> Box<dyn AuxiliaryService>;
}

/// Factory for the in-process implementations.
#[derive(Clone)]
pub struct LocalServiceFactory {
    metrics: Arc<UsageMetrics>,
}

impl LocalServiceFactory {
    /// Builds a factory whose API and admin services report usage to
    /// `metrics`.
    #[must_use]
    pub fn new(metrics: Arc<UsageMetrics>) -> Self {
        Self { metrics }
    }
}

impl ServiceFactory for LocalServiceFactory {
    fn dispatcher(&self, plan: DispatcherPlan) -> Box<dyn Dispatcher> {
        Box::new(LocalDispatcher::new(plan))
    }

    fn api_service(&self, config: ApiServiceConfig) -> Box<dyn AuxiliaryService> {
        Box::new(ApiService::new(config, Arc::clone(&self.metrics)))
    }

    fn grpc_api_service(&self, config: GrpcApiServiceConfig) -> Box<dyn AuxiliaryService> {
        Box::new(GrpcApiService::new(config))
    }

    fn admin_service(&self, config: AdminServiceConfig) -> Box<dyn AuxiliaryService> {
        let interceptor = UsageMetricsInterceptor::new(Arc::clone(&self.metrics));
        Box::new(AdminService::new(config, vec![Arc::new(interceptor)]))
    }
}

/// Listener bookkeeping shared by the TCP-backed services.
#[derive(Debug)]
struct ServiceListener {
    kind: ServiceKind,
    host: String,
    port: u16,
    handle: Option<ListenerHandle>,
}

impl ServiceListener {
    fn new(kind: ServiceKind, host: String, port: u16) -> Self {
        Self {
            kind,
            host,
            port,
            handle: None,
        }
    }

    fn start(&mut self, router: Router) -> Result<(), ServiceStartError> {
        if self.handle.is_some() {
            return Err(ServiceStartError::new(self.kind, "already running"));
        }
        let name = self.kind.to_string();
        let listener = SocketListener::bind(&name, &self.host, self.port).map_err(|source| {
            ServiceStartError::with_source(
                self.kind,
                format!("cannot bind {}:{}", self.host, self.port),
                source,
            )
        })?;
        let handle = listener
            .start(router)
            .map_err(|source| {
                ServiceStartError::with_source(self.kind, "cannot start listener", source)
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn quit(&mut self) -> Result<(), ServiceStopError> {
        match self.handle.take() {
            Some(handle) => handle
                .stop()
                .map_err(|error| ServiceStopError::new(self.kind, error.to_string())),
            None => Ok(()),
        }
    }

    fn port(&self) -> u16 {
        self.handle.as_ref().map_or(self.port, ListenerHandle::port)
    }
}
