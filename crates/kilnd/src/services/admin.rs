//! Admin service exposing the application's modules and instances.
//!
//! Handlers are registered with an explicit list of [`Interceptor`]s that run
//! before each handler, which is how handler usage reaches the metrics.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use axum::{Json, Router};
use camino::Utf8Path;
use rand::Rng;
use serde_json::json;

use super::{
    AdminServiceConfig, AuxiliaryService, ServiceKind, ServiceListener, ServiceStartError,
    ServiceStopError,
};
use crate::dispatcher::ModuleSummary;
use crate::metrics::{ADMIN_CONSOLE_CATEGORY, UsageMetrics};
use crate::transport::{JsonResponse, not_found};

const XSRF_SECRET_BYTES: usize = 16;

/// Cross-cutting hook invoked before an admin handler runs.
pub trait Interceptor: Send + Sync {
    /// Called with the handler name, e.g. `ModulesHandler.get`, and the path.
    fn before(&self, handler: &str, path: &str);
}

/// Records each admin handler once per run in the usage metrics.
pub struct UsageMetricsInterceptor {
    metrics: Arc<UsageMetrics>,
}

impl UsageMetricsInterceptor {
    /// Builds an interceptor reporting to `metrics`.
    #[must_use]
    pub fn new(metrics: Arc<UsageMetrics>) -> Self {
        Self { metrics }
    }
}

impl Interceptor for UsageMetricsInterceptor {
    fn before(&self, handler: &str, _path: &str) {
        self.metrics
            .log_once_on_stop(ADMIN_CONSOLE_CATEGORY, handler, None, None);
    }
}

/// Admin endpoints: `/`, `/modules` and `/instances`.
pub struct AdminService {
    config: AdminServiceConfig,
    interceptors: Vec<Arc<dyn Interceptor>>,
    listener: ServiceListener,
}

impl AdminService {
    /// Builds the service without binding.
    #[must_use]
    pub fn new(config: AdminServiceConfig, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        let listener = ServiceListener::new(ServiceKind::Admin, config.host.clone(), config.port);
        Self {
            config,
            interceptors,
            listener,
        }
    }
}

impl AuxiliaryService for AdminService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Admin
    }

    fn start(&mut self) -> Result<(), ServiceStartError> {
        ensure_xsrf_secret(&self.config.xsrf_path).map_err(|source| {
            ServiceStartError::with_source(
                ServiceKind::Admin,
                format!("cannot prepare XSRF secret at {}", self.config.xsrf_path),
                source,
            )
        })?;
        let state = Arc::new(AdminState {
            app_id: self.config.app_id.clone(),
            dispatch_address: self.config.dispatch_address.clone(),
            modules: self.config.modules.clone(),
            interceptors: self.interceptors.clone(),
        });
        let router = Router::new()
            .route("/", get(console))
            .route("/modules", get(modules))
            .route("/instances", get(instances))
            .fallback(not_found)
            .with_state(state);
        self.listener.start(router)
    }

    fn quit(&mut self) -> Result<(), ServiceStopError> {
        self.listener.quit()
    }

    fn port(&self) -> u16 {
        self.listener.port()
    }
}

struct AdminState {
    app_id: String,
    dispatch_address: String,
    modules: Vec<ModuleSummary>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl AdminState {
    fn intercept(&self, handler: &str, uri: &Uri) {
        for interceptor in &self.interceptors {
            interceptor.before(handler, uri.path());
        }
    }
}

async fn console(State(state): State<Arc<AdminState>>, uri: Uri) -> JsonResponse {
    state.intercept("ConsoleHandler.get", &uri);
    (
        StatusCode::OK,
        Json(json!({
            "app_id": state.app_id,
            "dispatch_address": state.dispatch_address,
            "modules": state.modules.len(),
        })),
    )
}

async fn modules(State(state): State<Arc<AdminState>>, uri: Uri) -> JsonResponse {
    state.intercept("ModulesHandler.get", &uri);
    (StatusCode::OK, Json(json!(state.modules)))
}

async fn instances(State(state): State<Arc<AdminState>>, uri: Uri) -> JsonResponse {
    state.intercept("InstancesHandler.get", &uri);
    let instances: Vec<_> = state
        .modules
        .iter()
        .flat_map(|module| {
            module
                .instance_addresses
                .iter()
                .enumerate()
                .map(|(index, address)| {
                    json!({
                        "module": module.name,
                        "instance": index,
                        "address": address,
                    })
                })
        })
        .collect();
    (StatusCode::OK, Json(json!(instances)))
}

/// Creates the XSRF secret unless one is already stored.
fn ensure_xsrf_secret(path: &Utf8Path) -> io::Result<()> {
    if path.is_file() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, generate_secret())
}

fn generate_secret() -> String {
    let bytes: [u8; XSRF_SECRET_BYTES] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(XSRF_SECRET_BYTES * 2), |mut secret, byte| {
            let _ = write!(secret, "{byte:02x}");
            secret
        })
}
