//! Dispatcher that binds every module to a local TCP listener.
//!
//! The front listener takes the configured port. Each module then receives a
//! balanced listener on the next port, followed by one listener per manually
//! scaled instance, so `--port 8080` with modules `default` (two instances)
//! and `worker` yields 8080 (front), 8081 (default), 8082-8083 (default
//! instances) and 8084 (worker). With port `0` every listener is ephemeral.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, warn};

use crate::dispatcher::{Dispatcher, DispatcherError, DispatcherPlan, ModulePlan, ModuleSummary};
use crate::transport::{JsonResponse, ListenerHandle, SocketListener};

const DISPATCHER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatcher");

/// API endpoint recorded at start and reported to module requests.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ApiEndpoint {
    address: String,
    grpc_apis: Vec<String>,
}

struct ModuleListeners {
    balanced: ListenerHandle,
    instances: Vec<ListenerHandle>,
}

/// [`Dispatcher`] serving modules from in-process listeners.
pub struct LocalDispatcher {
    plan: DispatcherPlan,
    front: Option<ListenerHandle>,
    modules: BTreeMap<String, ModuleListeners>,
}

impl LocalDispatcher {
    /// Builds a dispatcher for `plan` without binding anything.
    #[must_use]
    pub fn new(plan: DispatcherPlan) -> Self {
        Self {
            plan,
            front: None,
            modules: BTreeMap::new(),
        }
    }

    fn module_plan(&self, module: &str) -> Result<&ModulePlan, DispatcherError> {
        self.plan
            .modules
            .iter()
            .find(|plan| plan.name == module)
            .ok_or_else(|| DispatcherError::ModuleNotFound {
                module: module.to_owned(),
            })
    }

    fn address(&self, port: u16) -> String {
        format!("{}:{port}", self.plan.host)
    }

    fn summary(&self, plan: &ModulePlan) -> ModuleSummary {
        let listeners = self.modules.get(&plan.name);
        let balanced_port = listeners.map_or(0, |listeners| listeners.balanced.port());
        let instance_addresses = listeners
            .map(|listeners| {
                listeners
                    .instances
                    .iter()
                    .map(|instance| self.address(instance.port()))
                    .collect()
            })
            .unwrap_or_default();
        ModuleSummary {
            name: plan.name.clone(),
            version: plan.version.clone(),
            runtime: plan.runtime.clone(),
            threadsafe: plan.threadsafe,
            max_instances: plan.max_instances,
            balanced_address: self.address(balanced_port),
            instance_addresses,
        }
    }

    fn bind_all(&mut self, api: &ApiEndpoint) -> Result<(), DispatcherError> {
        let base = self.plan.port;
        let front = start_listener(
            "dispatcher",
            &self.plan.host,
            base,
            front_router(self.plan.modules.iter().map(|m| m.name.clone()).collect()),
        )?;
        info!(
            target: DISPATCHER_TARGET,
            address = %front.local_addr(),
            "dispatcher listening"
        );
        self.front = Some(front);

        let mut offset: u16 = 0;
        for plan in &self.plan.modules {
            let name = format!("module {}", plan.name);
            let balanced = start_listener(
                &name,
                &self.plan.host,
                next_port(base, &mut offset, &name)?,
                module_router(ModuleState::new(plan, None, api)),
            )?;
            let mut instances = Vec::new();
            for index in 0..plan.manual_instances.unwrap_or(0) {
                let name = format!("module {} instance {index}", plan.name);
                instances.push(start_listener(
                    &name,
                    &self.plan.host,
                    next_port(base, &mut offset, &name)?,
                    module_router(ModuleState::new(plan, Some(index), api)),
                )?);
            }
            info!(
                target: DISPATCHER_TARGET,
                module = %plan.name,
                port = balanced.port(),
                instances = instances.len(),
                "module listening"
            );
            self.modules
                .insert(plan.name.clone(), ModuleListeners { balanced, instances });
        }
        Ok(())
    }

    fn stop_listeners(&mut self) -> Result<(), DispatcherError> {
        let mut outcome = Ok(());
        let mut handles = Vec::new();
        for (name, listeners) in std::mem::take(&mut self.modules) {
            let label = format!("module {name}");
            handles.push((label.clone(), listeners.balanced));
            handles.extend(
                listeners
                    .instances
                    .into_iter()
                    .map(|instance| (label.clone(), instance)),
            );
        }
        if let Some(front) = self.front.take() {
            handles.push(("dispatcher".to_owned(), front));
        }
        for (_, handle) in &mut handles {
            handle.shutdown();
        }
        for (name, handle) in handles {
            if let Err(source) = handle.join() {
                warn!(
                    target: DISPATCHER_TARGET,
                    listener = %name,
                    error = %source,
                    "listener failed to stop"
                );
                if outcome.is_ok() {
                    outcome = Err(DispatcherError::Listener { name, source });
                }
            }
        }
        outcome
    }
}

impl Dispatcher for LocalDispatcher {
    fn start(
        &mut self,
        api_host: &str,
        api_port: u16,
        grpc_apis: &[String],
    ) -> Result<(), DispatcherError> {
        if self.front.is_some() {
            return Ok(());
        }
        let api = ApiEndpoint {
            address: format!("{api_host}:{api_port}"),
            grpc_apis: grpc_apis.to_vec(),
        };
        if let Err(error) = self.bind_all(&api) {
            // Release whatever bound before the failure.
            if let Err(cleanup) = self.stop_listeners() {
                warn!(
                    target: DISPATCHER_TARGET,
                    error = %cleanup,
                    "failed to release listeners after a failed start"
                );
            }
            return Err(error);
        }
        Ok(())
    }

    fn quit(&mut self) -> Result<(), DispatcherError> {
        self.stop_listeners()
    }

    fn get_hostname(
        &self,
        module: &str,
        version: &str,
        instance: Option<u32>,
    ) -> Result<String, DispatcherError> {
        let plan = self.module_plan(module)?;
        if plan.version != version {
            return Err(DispatcherError::VersionNotFound {
                module: module.to_owned(),
                version: version.to_owned(),
            });
        }
        let summary = self.summary(plan);
        match instance {
            None => Ok(summary.balanced_address),
            Some(index) => usize::try_from(index)
                .ok()
                .and_then(|position| summary.instance_addresses.get(position).cloned())
                .ok_or_else(|| DispatcherError::InstanceNotFound {
                    module: module.to_owned(),
                    instance: index,
                }),
        }
    }

    fn get_default_version(&self, module: &str) -> Result<String, DispatcherError> {
        self.module_plan(module).map(|plan| plan.version.clone())
    }

    fn get_module_by_name(&self, module: &str) -> Result<ModuleSummary, DispatcherError> {
        self.module_plan(module).map(|plan| self.summary(plan))
    }

    fn modules(&self) -> Vec<ModuleSummary> {
        self.plan
            .modules
            .iter()
            .map(|plan| self.summary(plan))
            .collect()
    }

    fn dispatch_address(&self) -> String {
        let port = self
            .front
            .as_ref()
            .map_or(self.plan.port, ListenerHandle::port);
        self.address(port)
    }
}

fn next_port(base: u16, offset: &mut u16, name: &str) -> Result<u16, DispatcherError> {
    let exhausted = || DispatcherError::PortExhausted {
        name: name.to_owned(),
        base,
    };
    *offset = offset.checked_add(1).ok_or_else(exhausted)?;
    if base == 0 {
        return Ok(0);
    }
    base.checked_add(*offset).ok_or_else(exhausted)
}

fn start_listener(
    name: &str,
    host: &str,
    port: u16,
    router: Router,
) -> Result<ListenerHandle, DispatcherError> {
    let wrap = |source| DispatcherError::Listener {
        name: name.to_owned(),
        source,
    };
    SocketListener::bind(name, host, port)
        .and_then(|listener| listener.start(router))
        .map_err(wrap)
}

fn front_router(modules: Vec<String>) -> Router {
    Router::new()
        .fallback(front_request)
        .with_state(Arc::new(modules))
}

async fn front_request(State(modules): State<Arc<Vec<String>>>, uri: Uri) -> JsonResponse {
    (
        StatusCode::OK,
        Json(json!({
            "path": uri.path(),
            "modules": *modules,
        })),
    )
}

struct ModuleState {
    module: String,
    version: String,
    runtime: String,
    instance: Option<u32>,
    api: ApiEndpoint,
}

impl ModuleState {
    fn new(plan: &ModulePlan, instance: Option<u32>, api: &ApiEndpoint) -> Self {
        Self {
            module: plan.name.clone(),
            version: plan.version.clone(),
            runtime: plan.runtime.clone(),
            instance,
            api: api.clone(),
        }
    }
}

fn module_router(state: ModuleState) -> Router {
    Router::new()
        .fallback(module_request)
        .with_state(Arc::new(state))
}

async fn module_request(State(state): State<Arc<ModuleState>>, uri: Uri) -> JsonResponse {
    (
        StatusCode::OK,
        Json(json!({
            "module": state.module,
            "version": state.version,
            "runtime": state.runtime,
            "instance": state.instance,
            "path": uri.path(),
            "api_server": state.api.address,
            "grpc_apis": state.api.grpc_apis,
        })),
    )
}
