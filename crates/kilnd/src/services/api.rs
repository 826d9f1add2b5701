//! Primary API emulation service.
//!
//! `GET /` describes the application. `POST /{service}/{method}` answers a
//! stubbed API call and records the stub's use once per run.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use super::{
    ApiServiceConfig, AuxiliaryService, ServiceKind, ServiceListener, ServiceStartError,
    ServiceStopError,
};
use crate::metrics::{API_STUB_USAGE_CATEGORY, UsageMetrics};
use crate::transport::{JsonResponse, not_found};

/// Serves application metadata and API stubs to runtimes.
pub struct ApiService {
    config: ApiServiceConfig,
    balanced_address: Arc<Mutex<Option<String>>>,
    metrics: Arc<UsageMetrics>,
    listener: ServiceListener,
}

impl ApiService {
    /// Builds the service without binding.
    #[must_use]
    pub fn new(config: ApiServiceConfig, metrics: Arc<UsageMetrics>) -> Self {
        let listener = ServiceListener::new(ServiceKind::Api, config.host.clone(), config.port);
        Self {
            config,
            balanced_address: Arc::new(Mutex::new(None)),
            metrics,
            listener,
        }
    }

    fn router(&self) -> Router {
        let state = Arc::new(ApiState {
            app_id: self.config.app_id.clone(),
            storage_path: self.config.storage_path.to_string(),
            balanced_address: Arc::clone(&self.balanced_address),
            metrics: Arc::clone(&self.metrics),
        });
        Router::new()
            .route("/", get(describe))
            .route("/{service}/{method}", post(stub_call))
            .fallback(not_found)
            .with_state(state)
    }
}

impl AuxiliaryService for ApiService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Api
    }

    fn start(&mut self) -> Result<(), ServiceStartError> {
        let router = self.router();
        self.listener.start(router)
    }

    fn quit(&mut self) -> Result<(), ServiceStopError> {
        self.listener.quit()
    }

    fn port(&self) -> u16 {
        self.listener.port()
    }

    fn set_balanced_address(&mut self, address: &str) {
        let mut slot = self
            .balanced_address
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *slot = Some(address.to_owned());
    }
}

struct ApiState {
    app_id: String,
    storage_path: String,
    balanced_address: Arc<Mutex<Option<String>>>,
    metrics: Arc<UsageMetrics>,
}

async fn describe(State(state): State<Arc<ApiState>>) -> JsonResponse {
    let balanced_address = state
        .balanced_address
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
        .clone();
    (
        StatusCode::OK,
        Json(json!({
            "app_id": state.app_id,
            "storage_path": state.storage_path,
            "balanced_address": balanced_address,
        })),
    )
}

async fn stub_call(
    State(state): State<Arc<ApiState>>,
    Path((service, method)): Path<(String, String)>,
) -> JsonResponse {
    state.metrics.log_once_on_stop(
        API_STUB_USAGE_CATEGORY,
        &format!("use-{service}"),
        None,
        None,
    );
    (
        StatusCode::OK,
        Json(json!({
            "app_id": state.app_id,
            "service": service,
            "method": method,
        })),
    )
}
