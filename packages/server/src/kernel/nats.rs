//! NATS JetStream plumbing for production and testing.
//!
//! The broker is modelled as a topic exchange: an exchange name is a subject
//! prefix captured by one JetStream stream, and a routing key is the subject
//! suffix. `BrokerConnection` owns the link lifecycle and serializes
//! reconnects; `NatsEventPublisher` turns domain events into messages.

use anyhow::{anyhow, Context, Result};
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domains::auth::events::AuthEvent;
use crate::kernel::BaseEventPublisher;

pub type Headers = Vec<(String, String)>;

/// A published message.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub headers: Headers,
    pub payload: Bytes,
}

impl PublishedMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PublishFailure {
    /// The underlying connection is gone; a reconnect may help.
    #[error("broker connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Trait for NATS publish operations.
///
/// This allows swapping between real NATS and test mocks.
#[async_trait]
pub trait NatsPublisher: Send + Sync {
    async fn publish(
        &self,
        subject: String,
        headers: Headers,
        payload: Bytes,
    ) -> std::result::Result<(), PublishFailure>;

    fn is_connected(&self) -> bool {
        true
    }
}

/// Opens new broker links.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn NatsPublisher>>;
}

/// Stream layout shared by the publisher and the consumer.
#[derive(Debug, Clone)]
pub struct BrokerTopology {
    pub url: String,
    /// Subject prefix every routing key is published under
    pub exchange: String,
    pub stream_name: String,
    /// Create the stream (and consumers) when missing instead of assuming them
    pub declare: bool,
}

impl BrokerTopology {
    pub fn subject_for(&self, routing_key: &str) -> String {
        format!("{}.{}", self.exchange, routing_key)
    }

    /// Strip the exchange prefix off a subject, leaving the routing key.
    pub fn routing_key<'a>(&self, subject: &'a str) -> &'a str {
        subject
            .strip_prefix(self.exchange.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(subject)
    }
}

/// Look the stream up and, when allowed, create it if missing.
///
/// A failure to declare is logged and tolerated.
pub async fn ensure_stream(js: &jetstream::Context, topology: &BrokerTopology) {
    match js.get_stream(&topology.stream_name).await {
        Ok(_) => {
            tracing::debug!(stream = %topology.stream_name, "stream exists");
        }
        Err(e) if topology.declare => {
            tracing::info!(stream = %topology.stream_name, error = %e, "stream lookup failed, declaring it");
            let config = jetstream::stream::Config {
                name: topology.stream_name.clone(),
                subjects: vec![format!("{}.>", topology.exchange)],
                ..Default::default()
            };
            if let Err(e) = js.get_or_create_stream(config).await {
                tracing::warn!(stream = %topology.stream_name, error = %e, "failed to declare stream");
            }
        }
        Err(e) => {
            tracing::warn!(stream = %topology.stream_name, error = %e, "stream not found and declaration disabled");
        }
    }
}

/// Real JetStream publisher bound to one client connection.
pub struct JetStreamPublisher {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl JetStreamPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }

    fn classify(&self, err: impl std::fmt::Display) -> PublishFailure {
        if self.is_connected() {
            PublishFailure::Other(anyhow!("publish failed: {}", err))
        } else {
            PublishFailure::ConnectionClosed
        }
    }
}

#[async_trait]
impl NatsPublisher for JetStreamPublisher {
    async fn publish(
        &self,
        subject: String,
        headers: Headers,
        payload: Bytes,
    ) -> std::result::Result<(), PublishFailure> {
        let mut header_map = async_nats::HeaderMap::new();
        for (name, value) in &headers {
            header_map.insert(name.as_str(), value.as_str());
        }

        let ack = self
            .jetstream
            .publish_with_headers(subject, header_map, payload)
            .await
            .map_err(|e| self.classify(e))?;
        ack.await.map_err(|e| self.classify(e))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }
}

/// Connects to NATS and makes sure the event stream exists.
pub struct JetStreamConnector {
    topology: BrokerTopology,
}

impl JetStreamConnector {
    pub fn new(topology: BrokerTopology) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl BrokerConnector for JetStreamConnector {
    async fn connect(&self) -> Result<Arc<dyn NatsPublisher>> {
        let client = async_nats::connect(self.topology.url.as_str())
            .await
            .context("Failed to connect to NATS")?;
        let publisher = JetStreamPublisher::new(client);
        ensure_stream(&publisher.jetstream, &self.topology).await;
        Ok(Arc::new(publisher))
    }
}

struct Link {
    generation: u64,
    publisher: Arc<dyn NatsPublisher>,
}

/// Shared broker link with lazy connect and serialized reconnects.
///
/// Every link carries a generation. A publisher that sees its link fail asks
/// for a reconnect naming that generation; if another task already replaced
/// it, the fresh link is reused instead of connecting again.
pub struct BrokerConnection {
    connector: Arc<dyn BrokerConnector>,
    link: tokio::sync::RwLock<Option<Link>>,
    reconnect: Mutex<()>,
    generations: AtomicU64,
}

impl BrokerConnection {
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            connector,
            link: tokio::sync::RwLock::new(None),
            reconnect: Mutex::new(()),
            generations: AtomicU64::new(0),
        }
    }

    async fn current(&self) -> Option<(u64, Arc<dyn NatsPublisher>)> {
        self.link
            .read()
            .await
            .as_ref()
            .map(|link| (link.generation, link.publisher.clone()))
    }

    /// Return a live link, connecting unless someone already replaced `stale`.
    async fn establish(&self, stale: Option<u64>) -> Result<(u64, Arc<dyn NatsPublisher>)> {
        let _guard = self.reconnect.lock().await;

        if let Some((generation, publisher)) = self.current().await {
            if Some(generation) != stale {
                return Ok((generation, publisher));
            }
        }

        let publisher = self.connector.connect().await?;
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        *self.link.write().await = Some(Link {
            generation,
            publisher: publisher.clone(),
        });
        tracing::info!(generation, "broker link established");
        Ok((generation, publisher))
    }

    /// Publish, reconnecting once if the link reports a closed connection.
    pub async fn publish(&self, subject: String, headers: Headers, payload: Bytes) -> Result<()> {
        let (generation, publisher) = match self.current().await {
            Some(link) => link,
            None => self.establish(None).await?,
        };

        match publisher
            .publish(subject.clone(), headers.clone(), payload.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(PublishFailure::ConnectionClosed) => {
                tracing::warn!(generation, "broker connection closed, reconnecting");
                let (_, publisher) = self.establish(Some(generation)).await?;
                publisher
                    .publish(subject, headers, payload)
                    .await
                    .map_err(|e| anyhow!("publish failed after reconnect: {}", e))
            }
            Err(PublishFailure::Other(e)) => Err(e),
        }
    }

    /// Open the link now instead of on the first publish.
    pub async fn connect(&self) -> Result<()> {
        self.establish(None).await.map(|_| ())
    }

    pub async fn is_connected(&self) -> bool {
        match self.link.read().await.as_ref() {
            Some(link) => link.publisher.is_connected(),
            None => false,
        }
    }

    /// Number of links opened so far
    pub fn generation(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }
}

/// Publishes auth events under the topology's subjects with metadata headers.
pub struct NatsEventPublisher {
    connection: Arc<BrokerConnection>,
    topology: BrokerTopology,
    source: String,
}

impl NatsEventPublisher {
    pub const VERSION: &'static str = "v1";

    pub fn new(connection: Arc<BrokerConnection>, topology: BrokerTopology, source: String) -> Self {
        Self {
            connection,
            topology,
            source,
        }
    }
}

#[async_trait]
impl BaseEventPublisher for NatsEventPublisher {
    async fn publish(&self, event: &AuthEvent) -> Result<()> {
        let kind = event.kind();
        let (event_id, timestamp, body) = event
            .to_envelope_bytes()
            .context("Failed to serialize event")?;

        let headers = vec![
            ("event_type".to_string(), kind.routing_key().to_string()),
            ("event_id".to_string(), event_id.to_string()),
            ("timestamp".to_string(), timestamp.timestamp().to_string()),
            ("source".to_string(), self.source.clone()),
            ("version".to_string(), Self::VERSION.to_string()),
        ];
        let subject = self.topology.subject_for(kind.routing_key());

        self.connection
            .publish(subject.clone(), headers, Bytes::from(body))
            .await?;

        tracing::info!(%event_id, %subject, citizen_id = %event.citizen_id(), "event published");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }
}

/// In-memory publisher that records every message, for tests.
#[derive(Default)]
pub struct TestNats {
    published: RwLock<Vec<PublishedMessage>>,
}

impl TestNats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_publish(&self, subject: String, headers: Headers, payload: Bytes) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage {
                subject,
                headers,
                payload,
            });
    }

    pub fn messages_for_subject(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn decode<T: serde::de::DeserializeOwned>(
        &self,
        msg: &PublishedMessage,
    ) -> serde_json::Result<T> {
        serde_json::from_slice(&msg.payload)
    }
}

#[async_trait]
impl NatsPublisher for TestNats {
    async fn publish(
        &self,
        subject: String,
        headers: Headers,
        payload: Bytes,
    ) -> std::result::Result<(), PublishFailure> {
        self.record_publish(subject, headers, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::auth::events::{
        EventEnvelope, RegistrationCompleted, REGISTRATION_COMPLETED_KEY,
    };
    use crate::domains::auth::models::CitizenProfile;
    use std::sync::atomic::AtomicUsize;

    /// Publisher whose connection is always gone.
    struct DeadPublisher {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl NatsPublisher for DeadPublisher {
        async fn publish(
            &self,
            _subject: String,
            _headers: Headers,
            _payload: Bytes,
        ) -> std::result::Result<(), PublishFailure> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Err(PublishFailure::ConnectionClosed)
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    /// Publisher that fails with a non-connection error.
    struct RejectingPublisher {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl NatsPublisher for RejectingPublisher {
        async fn publish(
            &self,
            _subject: String,
            _headers: Headers,
            _payload: Bytes,
        ) -> std::result::Result<(), PublishFailure> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PublishFailure::Other(anyhow!("stream not found")))
        }
    }

    /// Hands out `first` on the first connect and `healthy` afterwards.
    struct ScriptedConnector {
        connects: AtomicUsize,
        first: Arc<dyn NatsPublisher>,
        healthy: Arc<TestNats>,
    }

    #[async_trait]
    impl BrokerConnector for ScriptedConnector {
        async fn connect(&self) -> Result<Arc<dyn NatsPublisher>> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(self.first.clone())
            } else {
                Ok(self.healthy.clone())
            }
        }
    }

    fn connector(first: Arc<dyn NatsPublisher>) -> (Arc<ScriptedConnector>, Arc<TestNats>) {
        let healthy = Arc::new(TestNats::new());
        let connector = Arc::new(ScriptedConnector {
            connects: AtomicUsize::new(0),
            first,
            healthy: healthy.clone(),
        });
        (connector, healthy)
    }

    #[tokio::test]
    async fn connects_lazily_on_first_publish() {
        let nats = Arc::new(TestNats::new());
        let (connector, _) = connector(nats.clone());
        let connection = BrokerConnection::new(connector.clone());

        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(!connection.is_connected().await);

        connection
            .publish("carpeta.events.x".into(), vec![], Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(nats.publish_count(), 1);
    }

    #[tokio::test]
    async fn closed_connection_triggers_one_reconnect_and_retry() {
        let dead = Arc::new(DeadPublisher {
            attempts: AtomicUsize::new(0),
        });
        let (connector, healthy) = connector(dead.clone());
        let connection = BrokerConnection::new(connector.clone());

        connection
            .publish("carpeta.events.x".into(), vec![], Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert_eq!(dead.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(connection.generation(), 2);
        assert_eq!(healthy.publish_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishers_share_a_single_reconnect() {
        let dead = Arc::new(DeadPublisher {
            attempts: AtomicUsize::new(0),
        });
        let (connector, healthy) = connector(dead);
        let connection = Arc::new(BrokerConnection::new(connector.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let connection = connection.clone();
                tokio::spawn(async move {
                    connection
                        .publish(format!("carpeta.events.{i}"), vec![], Bytes::new())
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // One initial connect plus exactly one reconnect.
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(healthy.publish_count(), 16);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let rejecting = Arc::new(RejectingPublisher {
            attempts: AtomicUsize::new(0),
        });
        let (connector, healthy) = connector(rejecting.clone());
        let connection = BrokerConnection::new(connector.clone());

        let result = connection
            .publish("carpeta.events.x".into(), vec![], Bytes::new())
            .await;

        assert!(result.is_err());
        assert_eq!(rejecting.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.publish_count(), 0);
    }

    #[tokio::test]
    async fn event_publisher_sets_subject_and_headers() {
        let nats = Arc::new(TestNats::new());
        let (connector, _) = connector(nats.clone());
        let publisher = NatsEventPublisher::new(
            Arc::new(BrokerConnection::new(connector)),
            BrokerTopology {
                url: "nats://localhost:4222".into(),
                exchange: "gov.auth".into(),
                stream_name: "GOV_AUTH".into(),
                declare: false,
            },
            "auth-service".into(),
        );

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
        publisher.publish(&event).await.unwrap();

        assert!(nats
            .messages_for_subject("carpeta.events.user.registration.complete")
            .is_empty());
        let messages = nats.messages_for_subject("gov.auth.user.registration.complete");
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.header("event_type"), Some(REGISTRATION_COMPLETED_KEY));
        assert_eq!(msg.header("source"), Some("auth-service"));
        assert_eq!(msg.header("version"), Some("v1"));

        let envelope: EventEnvelope<RegistrationCompleted> = nats.decode(msg).unwrap();
        assert_eq!(Some(envelope.event_id.to_string().as_str()), msg.header("event_id"));
        assert_eq!(envelope.payload.folder_id, "F1");
    }

    #[test]
    fn topology_maps_subjects_and_routing_keys() {
        let topology = BrokerTopology {
            url: "nats://localhost:4222".into(),
            exchange: "carpeta.events".into(),
            stream_name: "CARPETA_EVENTS".into(),
            declare: true,
        };

        let subject = topology.subject_for("user.registration.email");
        assert_eq!(subject, "carpeta.events.user.registration.email");
        assert_eq!(topology.routing_key(&subject), "user.registration.email");
        assert_eq!(topology.routing_key("other.subject"), "other.subject");
    }
}
