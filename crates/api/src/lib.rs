//! HTTP API for the storefront backend.
//!
//! Serves the REST surface under `/api/v1` with bearer-token auth, plus
//! `/health` and the Prometheus `/metrics` endpoint at the root.

pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use store::DocumentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use state::{AppState, Gateways};

/// Path prefix for every versioned endpoint.
pub const API_PREFIX: &str = "/api/v1";

fn api_routes<S: DocumentStore + Clone + 'static>() -> Router<Arc<AppState<S>>> {
    use routes::{auth, cart, categories, orders, products, reviews, users};

    Router::new()
        .route("/auth/register", post(auth::register::<S>))
        .route("/auth/login", post(auth::login::<S>))
        .route(
            "/auth/send-verification-email",
            post(auth::send_verification_email::<S>),
        )
        .route("/auth/verify-email/{token}", get(auth::verify_email::<S>))
        .route("/auth/forget-password", post(auth::forget_password::<S>))
        .route("/auth/reset-password/{token}", post(auth::reset_password::<S>))
        .route("/users", get(users::list::<S>).post(users::create::<S>))
        .route(
            "/users/{id}",
            get(users::get::<S>)
                .patch(users::update::<S>)
                .delete(users::delete::<S>),
        )
        .route(
            "/category",
            get(categories::list::<S>).post(categories::create::<S>),
        )
        .route(
            "/category/{id}",
            get(categories::get::<S>)
                .patch(categories::update::<S>)
                .delete(categories::delete::<S>),
        )
        .route("/product", get(products::list::<S>).post(products::create::<S>))
        .route(
            "/product/{id}",
            get(products::get::<S>)
                .patch(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route(
            "/cart",
            get(cart::get::<S>).post(cart::add::<S>).delete(cart::clear::<S>),
        )
        .route(
            "/cart/{product_id}",
            patch(cart::update_quantity::<S>).delete(cart::remove::<S>),
        )
        .route("/order", get(orders::list::<S>))
        .route("/order/webhook-checkout", post(orders::webhook_checkout::<S>))
        .route(
            "/order/checkout-session/{id}",
            post(orders::create_checkout_session::<S>),
        )
        .route("/order/{id}", get(orders::get::<S>))
        .route("/order/{id}/status", patch(orders::update_status::<S>))
        .route("/order/{id}/cod", post(orders::create_cash_order::<S>))
        .route("/review", get(reviews::list::<S>).post(reviews::create::<S>))
        .route(
            "/review/{id}",
            get(reviews::get::<S>)
                .patch(reviews::update::<S>)
                .delete(reviews::delete::<S>),
        )
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DocumentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .nest(API_PREFIX, api_routes::<S>().with_state(state))
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds application state over `store` with the given gateways.
pub fn create_state<S: DocumentStore + Clone + 'static>(
    store: S,
    config: &Config,
    gateways: Gateways,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, config, gateways))
}
