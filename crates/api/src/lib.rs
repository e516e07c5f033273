//! HTTP API server for the storefront.
//!
//! Exposes the catalog, shopping carts, checkout, promo codes, and the
//! order fulfillment queue over REST, with structured logging (tracing)
//! and Prometheus metrics. The caller's identity arrives as trusted
//! headers from the identity collaborator in front of this service.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use checkout::CheckoutService;
use metrics_exporter_prometheus::PrometheusHandle;
use store::StorefrontStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: StorefrontStore> {
    pub checkout: CheckoutService<S>,
}

impl<S: StorefrontStore> AppState<S> {
    /// Wraps a store in the checkout service and shared state.
    pub fn new(store: S) -> Arc<Self> {
        Arc::new(Self {
            checkout: CheckoutService::new(store),
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StorefrontStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<S>))
        .route("/products", post(routes::products::create::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/products/{id}", put(routes::products::update::<S>))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart", delete(routes::cart::clear::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route("/cart/items/{product_id}", put(routes::cart::set_item::<S>))
        .route(
            "/cart/items/{product_id}",
            delete(routes::cart::remove_item::<S>),
        )
        .route("/orders", post(routes::orders::place::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/queue", get(routes::orders::queue::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .route("/promo-codes/validate", post(routes::promos::validate::<S>))
        .route("/promo-codes", get(routes::promos::list::<S>))
        .route("/promo-codes", post(routes::promos::create::<S>))
        .route("/promo-codes/{id}", put(routes::promos::update::<S>))
        .route("/promo-codes/{id}", delete(routes::promos::delete::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
