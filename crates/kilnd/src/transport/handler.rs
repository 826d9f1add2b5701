//! Shared JSON replies for the HTTP routers.

use axum::Json;
use axum::http::{StatusCode, Uri};
use serde_json::{Value, json};

/// Status and JSON body returned by the routers.
pub(crate) type JsonResponse = (StatusCode, Json<Value>);

/// Fallback for paths no route matches.
pub(crate) async fn not_found(uri: Uri) -> JsonResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "no such page", "path": uri.path() })),
    )
}
