//! HTTP API server for the inventory backend.
//!
//! Thin shim over the engine: routes, error→status mapping, and identity
//! extraction. Authentication itself happens upstream; the server trusts
//! the `x-user-id` / `x-user-role` headers its gateway injects, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use domain::{OrderPolicy, OrderService, StockService};
use metrics_exporter_prometheus::PrometheusHandle;
use stock_store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store + Clone> {
    pub orders: OrderService<S>,
    pub stock: StockService<S>,
}

/// Creates the application state over a store.
pub fn create_state<S: Store + Clone>(store: S, policy: OrderPolicy) -> Arc<AppState<S>> {
    Arc::new(AppState {
        orders: OrderService::with_policy(store.clone(), policy),
        stock: StockService::new(store),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}", delete(routes::orders::remove::<S>))
        .route("/orders/{id}/items", patch(routes::orders::update_items::<S>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .route("/stock-units", post(routes::stock_units::create::<S>))
        .route("/stock-units/{id}", get(routes::stock_units::get::<S>))
        .route("/stock-units/{id}", patch(routes::stock_units::update::<S>))
        .route(
            "/stock-units/{id}",
            delete(routes::stock_units::remove::<S>),
        )
        .route(
            "/stock-units/{id}/adjust",
            post(routes::stock_units::adjust::<S>),
        )
        .route(
            "/stock-units/{id}/movements",
            get(routes::stock_units::movements::<S>),
        )
        .route(
            "/collections/{id}/stock-units",
            get(routes::stock_units::list_in_collection::<S>),
        )
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
