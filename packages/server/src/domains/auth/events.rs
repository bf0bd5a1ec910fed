use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::auth::models::CitizenProfile;

pub const REGISTRATION_REQUESTED_KEY: &str = "user.registration.email";
pub const REGISTRATION_COMPLETED_KEY: &str = "user.registration.complete";
pub const DIRECT_EMAIL_KEY: &str = "notifications.email.send";

/// Routing-key patterns ending in `*` match any key sharing the prefix.
const PATTERNS: &[(&str, EventKind)] = &[("notifications.email.*", EventKind::DirectEmail)];

/// Every kind of message that crosses the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RegistrationRequested,
    RegistrationCompleted,
    /// Inbound only: a ready-made email from any producer
    DirectEmail,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::RegistrationRequested,
        EventKind::RegistrationCompleted,
        EventKind::DirectEmail,
    ];

    pub fn routing_key(self) -> &'static str {
        match self {
            EventKind::RegistrationRequested => REGISTRATION_REQUESTED_KEY,
            EventKind::RegistrationCompleted => REGISTRATION_COMPLETED_KEY,
            EventKind::DirectEmail => DIRECT_EMAIL_KEY,
        }
    }

    /// Resolve a routing key: exact match first, then prefix patterns.
    pub fn resolve(routing_key: &str) -> Option<Self> {
        if let Some(kind) = Self::ALL.into_iter().find(|k| k.routing_key() == routing_key) {
            return Some(kind);
        }

        PATTERNS.iter().find_map(|(pattern, kind)| {
            pattern
                .strip_suffix('*')
                .filter(|prefix| routing_key.starts_with(prefix))
                .map(|_| *kind)
        })
    }
}

/// Domain events emitted by the registration saga.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    RegistrationRequested(RegistrationRequested),
    RegistrationCompleted(RegistrationCompleted),
}

impl AuthEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AuthEvent::RegistrationRequested(_) => EventKind::RegistrationRequested,
            AuthEvent::RegistrationCompleted(_) => EventKind::RegistrationCompleted,
        }
    }

    pub fn citizen_id(&self) -> &str {
        match self {
            AuthEvent::RegistrationRequested(e) => &e.profile.citizen_id,
            AuthEvent::RegistrationCompleted(e) => &e.profile.citizen_id,
        }
    }

    /// Wrap in a fresh envelope and serialize to JSON.
    pub fn to_envelope_bytes(&self) -> serde_json::Result<(Uuid, DateTime<Utc>, Vec<u8>)> {
        let event_id = Uuid::new_v4();
        let timestamp = Utc::now();
        let bytes = match self {
            AuthEvent::RegistrationRequested(payload) => {
                serde_json::to_vec(&EventEnvelope::new(event_id, timestamp, self.kind(), payload))?
            }
            AuthEvent::RegistrationCompleted(payload) => {
                serde_json::to_vec(&EventEnvelope::new(event_id, timestamp, self.kind(), payload))?
            }
        };
        Ok((event_id, timestamp, bytes))
    }
}

/// Wire envelope shared by all published events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<P> {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub routing_key: String,
    pub payload: P,
}

impl<P> EventEnvelope<P> {
    pub fn new(event_id: Uuid, timestamp: DateTime<Utc>, kind: EventKind, payload: P) -> Self {
        Self {
            event_id,
            event_type: kind.routing_key().to_string(),
            timestamp,
            routing_key: kind.routing_key().to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequested {
    pub profile: CitizenProfile,
    pub token: String,
    pub verification_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationCompleted {
    pub profile: CitizenProfile,
    pub external_id: String,
    pub folder_id: String,
}

/// Flat email request published by other services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub from: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_keys_resolve_to_their_kind() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::resolve(kind.routing_key()), Some(kind));
        }
    }

    #[test]
    fn prefix_pattern_matches_email_family() {
        assert_eq!(
            EventKind::resolve("notifications.email.bulk"),
            Some(EventKind::DirectEmail)
        );
        assert_eq!(EventKind::resolve("notifications.sms.send"), None);
        assert_eq!(EventKind::resolve("user.registration"), None);
    }

    #[test]
    fn envelope_carries_routing_metadata() {
        let event = AuthEvent::RegistrationCompleted(RegistrationCompleted {
            profile: CitizenProfile {
                citizen_id: "123".into(),
                email: "a@x.com".into(),
                full_name: "Ann".into(),
                phone: None,
                address: None,
            },
            external_id: "ext-1".into(),
            folder_id: "F1".into(),
        });

        let (event_id, _, bytes) = event.to_envelope_bytes().unwrap();
        let decoded: EventEnvelope<RegistrationCompleted> = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.event_id, event_id);
        assert_eq!(decoded.routing_key, REGISTRATION_COMPLETED_KEY);
        assert_eq!(decoded.event_type, REGISTRATION_COMPLETED_KEY);
        assert_eq!(decoded.payload.folder_id, "F1");
    }
}
