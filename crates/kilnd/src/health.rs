//! Structured health reporting for supervisor lifecycle events.

use std::error::Error;
use std::sync::Arc;

use crate::services::{ServiceKind, ServiceStartError};
use crate::supervisor::SupervisorError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the first service is created.
    fn supervisor_starting(&self);

    /// Invoked after every service and the dispatcher are running.
    fn supervisor_running(&self, dispatch_address: &str);

    /// Invoked when startup aborts.
    fn supervisor_failed(&self, error: &SupervisorError);

    /// Invoked after teardown completes following a successful start.
    fn supervisor_stopped(&self);

    /// Invoked before a service is started.
    fn service_starting(&self, kind: ServiceKind);

    /// Invoked after a service has bound its port.
    fn service_ready(&self, kind: ServiceKind, port: u16);

    /// Invoked when a service fails to start.
    fn service_failed(&self, error: &ServiceStartError);

    /// Invoked after the dispatcher has bound every module.
    fn dispatcher_ready(&self, address: &str);

    /// Invoked after a service or the dispatcher stops.
    fn component_stopped(&self, component: &str);

    /// Invoked when stopping a service or the dispatcher fails.
    fn teardown_failed(&self, component: &str, error: &dyn Error);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn supervisor_starting(&self) {
        (**self).supervisor_starting();
    }

    fn supervisor_running(&self, dispatch_address: &str) {
        (**self).supervisor_running(dispatch_address);
    }

    fn supervisor_failed(&self, error: &SupervisorError) {
        (**self).supervisor_failed(error);
    }

    fn supervisor_stopped(&self) {
        (**self).supervisor_stopped();
    }

    fn service_starting(&self, kind: ServiceKind) {
        (**self).service_starting(kind);
    }

    fn service_ready(&self, kind: ServiceKind, port: u16) {
        (**self).service_ready(kind, port);
    }

    fn service_failed(&self, error: &ServiceStartError) {
        (**self).service_failed(error);
    }

    fn dispatcher_ready(&self, address: &str) {
        (**self).dispatcher_ready(address);
    }

    fn component_stopped(&self, component: &str) {
        (**self).component_stopped(component);
    }

    fn teardown_failed(&self, component: &str, error: &dyn Error) {
        (**self).teardown_failed(component, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn supervisor_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "supervisor_starting",
            "starting development server"
        );
    }

    fn supervisor_running(&self, dispatch_address: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "supervisor_running",
            dispatch_address,
            "development server running"
        );
    }

    fn supervisor_failed(&self, error: &SupervisorError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "supervisor_failed",
            error = %error,
            "development server failed to start"
        );
    }

    fn supervisor_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "supervisor_stopped",
            "development server stopped"
        );
    }

    fn service_starting(&self, kind: ServiceKind) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "service_starting",
            service = %kind,
            "starting service"
        );
    }

    fn service_ready(&self, kind: ServiceKind, port: u16) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_ready",
            service = %kind,
            port,
            "service ready"
        );
    }

    fn service_failed(&self, error: &ServiceStartError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "service_failed",
            service = %error.kind,
            message = %error.message(),
            error = ?error,
            "service failed to start"
        );
    }

    fn dispatcher_ready(&self, address: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "dispatcher_ready",
            address,
            "dispatcher ready"
        );
    }

    fn component_stopped(&self, component: &str) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "component_stopped",
            component,
            "component stopped"
        );
    }

    fn teardown_failed(&self, component: &str, error: &dyn Error) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "teardown_failed",
            component,
            error = %error,
            "component failed to stop"
        );
    }
}
