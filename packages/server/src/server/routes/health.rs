use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use std::time::Duration;

use crate::server::app::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: ComponentHealth,
    broker: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(message.into()),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Health check endpoint
///
/// Checks database responsiveness and whether the broker link is up.
/// Returns 200 OK if both are healthy, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match tokio::time::timeout(CHECK_TIMEOUT, state.deps.store.ping()).await {
        Ok(Ok(())) => ComponentHealth::ok(),
        Ok(Err(e)) => ComponentHealth::error(format!("Query failed: {}", e)),
        Err(_) => ComponentHealth::error("Query timeout (>5s)"),
    };

    let broker = match tokio::time::timeout(CHECK_TIMEOUT, state.deps.events.is_connected()).await
    {
        Ok(true) => ComponentHealth::ok(),
        Ok(false) => ComponentHealth::error("Not connected"),
        Err(_) => ComponentHealth::error("Status check timeout (>5s)"),
    };

    let is_healthy = database.is_ok() && broker.is_ok();

    let (status_code, overall_status) = if is_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status: overall_status.to_string(),
            database,
            broker,
        }),
    )
}
