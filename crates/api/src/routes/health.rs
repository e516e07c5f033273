//! Liveness endpoint for the storefront service.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// GET /health — reports that the storefront is up.
///
/// Deliberately does not touch the store: load balancers poll this and a
/// database hiccup should surface as checkout errors, not a dead instance.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "storefront",
    })
}
