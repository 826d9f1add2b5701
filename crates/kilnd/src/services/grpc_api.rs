//! Secondary API emulation service for runtimes that speak gRPC.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::{
    AuxiliaryService, GrpcApiServiceConfig, ServiceKind, ServiceListener, ServiceStartError,
    ServiceStopError,
};
use crate::transport::{JsonResponse, not_found};

/// Serves the APIs routed over gRPC.
#[derive(Debug)]
pub struct GrpcApiService {
    apis: Arc<Vec<String>>,
    listener: ServiceListener,
}

impl GrpcApiService {
    /// Builds the service without binding.
    #[must_use]
    pub fn new(config: GrpcApiServiceConfig) -> Self {
        Self {
            listener: ServiceListener::new(ServiceKind::GrpcApi, config.host, config.port),
            apis: Arc::new(config.apis),
        }
    }
}

impl AuxiliaryService for GrpcApiService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::GrpcApi
    }

    fn start(&mut self) -> Result<(), ServiceStartError> {
        let router = Router::new()
            .route("/", get(list_apis))
            .fallback(not_found)
            .with_state(Arc::clone(&self.apis));
        self.listener.start(router)
    }

    fn quit(&mut self) -> Result<(), ServiceStopError> {
        self.listener.quit()
    }

    fn port(&self) -> u16 {
        self.listener.port()
    }
}

async fn list_apis(State(apis): State<Arc<Vec<String>>>) -> JsonResponse {
    (StatusCode::OK, Json(json!({ "grpc_apis": *apis })))
}
