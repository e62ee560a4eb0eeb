//! Healthcheck/metrics HTTP endpoint (spec B): a minimal `poem` server
//! exposing `/healthz` and `/version`, plus a Prometheus text-format
//! `/metrics` export, grounded on this codebase's
//! `cloud-component-service/src/api/healthcheck.rs` but adapted to plain
//! `poem` handlers since this crate carries no OpenAPI surface.

use crate::VERSION;
use poem::web::Json;
use poem::{get, handler, EndpointExt, Route};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;

#[derive(Serialize)]
struct HealthcheckResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
}

#[handler]
fn healthcheck() -> Json<HealthcheckResponse> {
    Json(HealthcheckResponse { status: "ok" })
}

#[handler]
fn version() -> Json<VersionResponse> {
    Json(VersionResponse { version: VERSION })
}

#[handler]
fn metrics(registry: poem::web::Data<&Registry>) -> String {
    let encoder = TextEncoder::new();
    let families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .expect("prometheus metric families always encode");
    String::from_utf8(buffer).expect("prometheus text encoding is always valid utf-8")
}

pub fn routes(registry: Registry) -> Route {
    Route::new()
        .at("/healthz", get(healthcheck))
        .at("/version", get(version))
        .at("/metrics", get(metrics).data(registry))
}
