use axum::Json;
use chrono::Utc;

use zip_types::api::{Envelope, HealthStatus, ServiceInfo};

const SERVICE_NAME: &str = "zip-api";

pub async fn root() -> Json<Envelope<ServiceInfo>> {
    Json(Envelope::ok(ServiceInfo {
        service: SERVICE_NAME,
        version: "1",
        status: "ok",
        health: "/api/v1/health",
    }))
}

pub async fn health() -> Json<Envelope<HealthStatus>> {
    Json(Envelope::ok(HealthStatus { status: "ok", service: SERVICE_NAME, timestamp: Utc::now() }))
}
