//! Recording service factory: hands out doubles that log every lifecycle
//! call to shared state and fail on demand.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dispatcher::{Dispatcher, DispatcherPlan};
use crate::services::{
    AdminServiceConfig, ApiServiceConfig, AuxiliaryService, GrpcApiServiceConfig, ServiceFactory,
    ServiceKind, ServiceStartError, ServiceStopError,
};

use super::dispatcher::RecordingDispatcher;

/// State shared by the factory and everything it creates.
#[derive(Default)]
pub(super) struct FactoryState {
    pub(super) calls: Vec<String>,
    pub(super) start_failures: HashSet<ServiceKind>,
    pub(super) stop_failures: HashSet<ServiceKind>,
    pub(super) dispatcher_start_fails: bool,
    pub(super) dispatcher_api_port: Option<u16>,
    balanced: Vec<(ServiceKind, String)>,
    plan: Option<DispatcherPlan>,
    admin: Option<AdminServiceConfig>,
    prepared: Option<Box<dyn Dispatcher>>,
}

pub(super) fn lock(state: &Mutex<FactoryState>) -> MutexGuard<'_, FactoryState> {
    state.lock().expect("factory state mutex poisoned")
}

/// Factory whose services and dispatcher record their lifecycle calls.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl RecordingFactory {
    /// Makes `kind` fail when started.
    pub fn fail_start(&self, kind: ServiceKind) {
        lock(&self.state).start_failures.insert(kind);
    }

    /// Makes `kind` fail when stopped.
    pub fn fail_stop(&self, kind: ServiceKind) {
        lock(&self.state).stop_failures.insert(kind);
    }

    /// Makes the recording dispatcher fail when started.
    pub fn fail_dispatcher_start(&self) {
        lock(&self.state).dispatcher_start_fails = true;
    }

    /// Hands `dispatcher` out instead of a recording dispatcher.
    pub fn use_dispatcher(&self, dispatcher: Box<dyn Dispatcher>) {
        lock(&self.state).prepared = Some(dispatcher);
    }

    /// Components whose start was attempted, in order.
    #[must_use]
    pub fn starts(&self) -> Vec<String> {
        self.calls_with_prefix("start ")
    }

    /// Components that were stopped, in order.
    #[must_use]
    pub fn quits(&self) -> Vec<String> {
        self.calls_with_prefix("quit ")
    }

    /// Balanced addresses handed to services.
    #[must_use]
    pub fn balanced_addresses(&self) -> Vec<(ServiceKind, String)> {
        lock(&self.state).balanced.clone()
    }

    /// Plan the dispatcher was built from.
    #[must_use]
    pub fn plan(&self) -> Option<DispatcherPlan> {
        lock(&self.state).plan.clone()
    }

    /// Settings the admin service was built from.
    #[must_use]
    pub fn admin_config(&self) -> Option<AdminServiceConfig> {
        lock(&self.state).admin.clone()
    }

    /// API port the dispatcher was started with.
    #[must_use]
    pub fn dispatcher_api_port(&self) -> Option<u16> {
        lock(&self.state).dispatcher_api_port
    }

    fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| call.strip_prefix(prefix))
            .map(str::to_owned)
            .collect()
    }

    fn service(&self, kind: ServiceKind, port: u16) -> Box<dyn AuxiliaryService> {
        Box::new(RecordingService {
            kind,
            port,
            state: Arc::clone(&self.state),
        })
    }
}

impl ServiceFactory for RecordingFactory {
    fn dispatcher(&self, plan: DispatcherPlan) -> Box<dyn Dispatcher> {
        let mut state = lock(&self.state);
        state.plan = Some(plan.clone());
        if let Some(prepared) = state.prepared.take() {
            return prepared;
        }
        Box::new(RecordingDispatcher::new(plan, Arc::clone(&self.state)))
    }

    fn api_service(&self, config: ApiServiceConfig) -> Box<dyn AuxiliaryService> {
        self.service(ServiceKind::Api, config.port)
    }

    fn grpc_api_service(&self, config: GrpcApiServiceConfig) -> Box<dyn AuxiliaryService> {
        self.service(ServiceKind::GrpcApi, config.port)
    }

    fn admin_service(&self, config: AdminServiceConfig) -> Box<dyn AuxiliaryService> {
        let port = config.port;
        lock(&self.state).admin = Some(config);
        self.service(ServiceKind::Admin, port)
    }
}

struct RecordingService {
    kind: ServiceKind,
    port: u16,
    state: Arc<Mutex<FactoryState>>,
}

impl AuxiliaryService for RecordingService {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    fn start(&mut self) -> Result<(), ServiceStartError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("start {}", self.kind));
        if state.start_failures.contains(&self.kind) {
            return Err(ServiceStartError::new(self.kind, "deliberate start failure"));
        }
        if self.port == 0 {
            self.port = match self.kind {
                ServiceKind::Api => 10_001,
                ServiceKind::GrpcApi => 10_002,
                ServiceKind::Admin => 10_003,
            };
        }
        Ok(())
    }

    fn quit(&mut self) -> Result<(), ServiceStopError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("quit {}", self.kind));
        if state.stop_failures.contains(&self.kind) {
            return Err(ServiceStopError::new(self.kind, "deliberate stop failure"));
        }
        Ok(())
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn set_balanced_address(&mut self, address: &str) {
        lock(&self.state)
            .balanced
            .push((self.kind, address.to_owned()));
    }
}
