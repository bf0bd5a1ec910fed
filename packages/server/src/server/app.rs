//! Application setup and router configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domains::notifications::{ConsumerStatus, NotificationSettings};
use crate::kernel::{BaseEmailGateway, ServerDeps};
use crate::server::middleware::extract_client_ip;
use crate::server::routes::{
    health_handler, introspect_handler, login_handler, logout_handler, register_handler,
    send_email_handler, set_password_handler, worker_health_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// State for the notifications worker's HTTP API
#[derive(Clone)]
pub struct WorkerState {
    pub email: Arc<dyn BaseEmailGateway>,
    pub settings: NotificationSettings,
    pub consumer: Arc<ConsumerStatus>,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

/// Build the Axum application router
pub fn build_app(deps: Arc<ServerDeps>, allowed_origins: &[String]) -> Router {
    let app_state = AppState { deps };

    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/set-password", post(set_password_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/session", get(introspect_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(extract_client_ip))
        .layer(Extension(app_state))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Build the notifications worker's router
pub fn build_worker_app(state: WorkerState) -> Router {
    Router::new()
        .route("/v1/email/send", post(send_email_handler))
        .route("/health", get(worker_health_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}
