//! Direct email API and health served by the notifications worker.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::common::{AuthError, AuthResult};
use crate::domains::auth::events::DirectEmail;
use crate::domains::auth::models::looks_like_email;
use crate::domains::notifications::handlers::direct_email;
use crate::server::app::WorkerState;

use super::auth::body;

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    #[serde(default)]
    pub sender_email: Option<String>,
    pub recipient_email: String,
    pub subject: String,
    pub message: String,
}

impl SendEmailRequest {
    fn into_direct_email(self) -> AuthResult<DirectEmail> {
        let to = self.recipient_email.trim().to_string();
        if !looks_like_email(&to) {
            return Err(AuthError::Validation(
                "recipient_email must be a valid email address".into(),
            ));
        }

        let from = self
            .sender_email
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(sender) = &from {
            if !looks_like_email(sender) {
                return Err(AuthError::Validation(
                    "sender_email must be a valid email address".into(),
                ));
            }
        }

        if self.subject.trim().is_empty() {
            return Err(AuthError::Validation("subject is required".into()));
        }

        Ok(DirectEmail {
            to,
            subject: self.subject,
            body: self.message,
            from,
        })
    }
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// POST /v1/email/send
///
/// Accepts the email and sends it in the background; delivery failures are
/// only logged.
pub async fn send_email_handler(
    Extension(state): Extension<WorkerState>,
    headers: HeaderMap,
    payload: Result<Json<SendEmailRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let email = direct_email(body(payload)?.into_direct_email()?, &state.settings);
    let tracking_id = format!("email-track-{}", request_id(&headers));

    tracing::info!(
        %tracking_id,
        to = %email.to,
        caller = headers
            .get("x-internal-service")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown"),
        "Direct email accepted"
    );

    let gateway = state.email.clone();
    let tracking = tracking_id.clone();
    tokio::spawn(async move {
        match gateway.send(&email).await {
            Ok(()) => tracing::info!(tracking_id = %tracking, "Direct email sent"),
            Err(e) => tracing::error!(tracking_id = %tracking, error = %e, "Direct email failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "tracking_id": tracking_id })),
    ))
}

#[derive(Serialize)]
pub struct WorkerHealthResponse {
    service: &'static str,
    status: &'static str,
    consumer: &'static str,
}

/// GET /health on the worker
///
/// 503 while the broker consumer is not reading.
pub async fn worker_health_handler(
    Extension(state): Extension<WorkerState>,
) -> (StatusCode, Json<WorkerHealthResponse>) {
    let running = state.consumer.is_running();
    let status = if running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(WorkerHealthResponse {
            service: "notifications-service",
            status: if running { "healthy" } else { "unhealthy" },
            consumer: if running { "running" } else { "stopped" },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request(to: &str, from: Option<&str>) -> SendEmailRequest {
        SendEmailRequest {
            sender_email: from.map(str::to_string),
            recipient_email: to.to_string(),
            subject: "Hola".into(),
            message: "Cuerpo".into(),
        }
    }

    #[test]
    fn blank_sender_falls_back_to_default() {
        let email = request(" ana@example.com ", Some("  ")).into_direct_email().unwrap();
        assert_eq!(email.to, "ana@example.com");
        assert!(email.from.is_none());
    }

    #[test]
    fn bad_addresses_are_rejected() {
        assert!(matches!(
            request("not-an-address", None).into_direct_email(),
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            request("ana@example.com", Some("nobody")).into_direct_email(),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn request_id_header_is_used_when_present() {
        let mut headers = HeaderMap::new();
        assert!(!request_id(&headers).is_empty());

        headers.insert("x-request-id", HeaderValue::from_static("req-42"));
        assert_eq!(request_id(&headers), "req-42");
    }
}
