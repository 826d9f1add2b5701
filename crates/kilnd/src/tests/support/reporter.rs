//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::error::Error;
use std::sync::Mutex;

use crate::health::HealthReporter;
use crate::services::{ServiceKind, ServiceStartError};
use crate::supervisor::SupervisorError;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Startup began.
    SupervisorStarting,
    /// Startup completed with the dispatcher at the given address.
    SupervisorRunning(String),
    /// Startup failed with an error description.
    SupervisorFailed(String),
    /// Teardown after a successful start completed.
    SupervisorStopped,
    /// A service start was attempted.
    ServiceStarting(ServiceKind),
    /// A service bound its port.
    ServiceReady(ServiceKind, u16),
    /// A service failed to start.
    ServiceFailed(ServiceKind),
    /// The dispatcher is serving.
    DispatcherReady(String),
    /// A component stopped cleanly.
    ComponentStopped(String),
    /// A component failed to stop.
    TeardownFailed(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn supervisor_starting(&self) {
        self.record(HealthEvent::SupervisorStarting);
    }

    fn supervisor_running(&self, dispatch_address: &str) {
        self.record(HealthEvent::SupervisorRunning(dispatch_address.to_owned()));
    }

    fn supervisor_failed(&self, error: &SupervisorError) {
        self.record(HealthEvent::SupervisorFailed(error.to_string()));
    }

    fn supervisor_stopped(&self) {
        self.record(HealthEvent::SupervisorStopped);
    }

    fn service_starting(&self, kind: ServiceKind) {
        self.record(HealthEvent::ServiceStarting(kind));
    }

    fn service_ready(&self, kind: ServiceKind, port: u16) {
        self.record(HealthEvent::ServiceReady(kind, port));
    }

    fn service_failed(&self, error: &ServiceStartError) {
        self.record(HealthEvent::ServiceFailed(error.kind));
    }

    fn dispatcher_ready(&self, address: &str) {
        self.record(HealthEvent::DispatcherReady(address.to_owned()));
    }

    fn component_stopped(&self, component: &str) {
        self.record(HealthEvent::ComponentStopped(component.to_owned()));
    }

    fn teardown_failed(&self, component: &str, _error: &dyn Error) {
        self.record(HealthEvent::TeardownFailed(component.to_owned()));
    }
}
