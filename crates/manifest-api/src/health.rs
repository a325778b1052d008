use axum::Json;
use serde_json::{Value, json};

use manifest_types::api::HealthResponse;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "ManifestLife API is running!" }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now(),
    })
}
