use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::handlers::{direct_email, verification_email, welcome_email, NotificationSettings};
use crate::domains::auth::events::{
    DirectEmail, EventEnvelope, EventKind, RegistrationCompleted, RegistrationRequested,
};
use crate::kernel::{BaseEmailGateway, EmailMessage};

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Negative acknowledgement without redelivery
    Reject,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("email delivery failed: {0}")]
    Send(anyhow::Error),
}

/// Dispatches deliveries by routing key to the email handlers.
pub struct NotificationRouter {
    email: Arc<dyn BaseEmailGateway>,
    settings: NotificationSettings,
}

impl NotificationRouter {
    pub fn new(email: Arc<dyn BaseEmailGateway>, settings: NotificationSettings) -> Self {
        Self { email, settings }
    }

    pub async fn route(&self, routing_key: &str, body: &[u8]) -> Disposition {
        let Some(kind) = EventKind::resolve(routing_key) else {
            info!(routing_key, "no handler for routing key, acknowledging");
            return Disposition::Ack;
        };

        match self.dispatch(kind, body).await {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                error!(routing_key, error = %e, "failed to process message");
                Disposition::Reject
            }
        }
    }

    async fn dispatch(&self, kind: EventKind, body: &[u8]) -> Result<(), HandlerError> {
        let message = match kind {
            EventKind::RegistrationRequested => {
                let event: EventEnvelope<RegistrationRequested> = serde_json::from_slice(body)?;
                info!(event_id = %event.event_id, citizen_id = %event.payload.profile.citizen_id, "sending verification email");
                verification_email(&event.payload, &self.settings)
            }
            EventKind::RegistrationCompleted => {
                let event: EventEnvelope<RegistrationCompleted> = serde_json::from_slice(body)?;
                info!(event_id = %event.event_id, citizen_id = %event.payload.profile.citizen_id, "sending welcome email");
                welcome_email(&event.payload, &self.settings)
            }
            EventKind::DirectEmail => {
                let event: DirectEmail = serde_json::from_slice(body)?;
                info!(to = %event.to, "sending direct email");
                direct_email(event, &self.settings)
            }
        };

        self.send(&message).await
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), HandlerError> {
        self.email.send(message).await.map_err(HandlerError::Send)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::auth::events::{
        DIRECT_EMAIL_KEY, REGISTRATION_COMPLETED_KEY, REGISTRATION_REQUESTED_KEY,
    };
    use crate::domains::auth::models::CitizenProfile;
    use crate::kernel::test_dependencies::MockEmailGateway;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn router(email: Arc<MockEmailGateway>) -> NotificationRouter {
        NotificationRouter::new(
            email,
            NotificationSettings {
                sender: "no-reply@carpeta.local".into(),
                login_url: "http://localhost/login".into(),
            },
        )
    }

    fn requested_body() -> Vec<u8> {
        let envelope = EventEnvelope::new(
            Uuid::new_v4(),
            Utc::now(),
            EventKind::RegistrationRequested,
            RegistrationRequested {
                profile: CitizenProfile {
                    citizen_id: "123".into(),
                    email: "a@x.com".into(),
                    full_name: "Ann".into(),
                    phone: None,
                    address: None,
                },
                token: "tok".into(),
                verification_url: "http://localhost/set-password?token=tok".into(),
                expires_at: Utc::now(),
            },
        );
        serde_json::to_vec(&envelope).unwrap()
    }

    #[tokio::test]
    async fn registration_requested_sends_verification_email() {
        let email = Arc::new(MockEmailGateway::new());
        let disposition = router(email.clone())
            .route(REGISTRATION_REQUESTED_KEY, &requested_body())
            .await;

        assert_eq!(disposition, Disposition::Ack);
        let sent = email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert!(sent[0].body.contains("token=tok"));
    }

    #[tokio::test]
    async fn unknown_routing_key_is_acked_without_handling() {
        let email = Arc::new(MockEmailGateway::new());
        let disposition = router(email.clone())
            .route("billing.invoice.created", b"not even json")
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(email.sent().is_empty());
    }

    #[tokio::test]
    async fn undecodable_body_is_rejected() {
        let email = Arc::new(MockEmailGateway::new());
        let disposition = router(email.clone())
            .route(REGISTRATION_COMPLETED_KEY, b"{\"oops\":")
            .await;

        assert_eq!(disposition, Disposition::Reject);
        assert!(email.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_rejected() {
        let email = Arc::new(MockEmailGateway::new().failing());
        let disposition = router(email.clone())
            .route(REGISTRATION_REQUESTED_KEY, &requested_body())
            .await;

        assert_eq!(disposition, Disposition::Reject);
    }

    #[tokio::test]
    async fn direct_email_family_matches_by_prefix() {
        let email = Arc::new(MockEmailGateway::new());
        let body = serde_json::to_vec(&json!({
            "to": "b@x.com",
            "subject": "Hola",
            "body": "Mensaje"
        }))
        .unwrap();

        let router = router(email.clone());
        assert_eq!(router.route(DIRECT_EMAIL_KEY, &body).await, Disposition::Ack);
        assert_eq!(
            router.route("notifications.email.reminder", &body).await,
            Disposition::Ack
        );

        let sent = email.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.to == "b@x.com" && m.from == "no-reply@carpeta.local"));
    }
}
