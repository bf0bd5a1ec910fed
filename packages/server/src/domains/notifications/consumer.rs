//! Durable JetStream consumer feeding the notification router.
//!
//! Deliveries are processed one at a time in delivery order. `Ack` maps to a
//! JetStream ack; `Reject` maps to `AckKind::Term`, which stops redelivery.

use anyhow::{Context, Result};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    AckKind,
};
use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::router::{Disposition, NotificationRouter};
use crate::kernel::nats::{ensure_stream, BrokerTopology};

/// Whether the consumer loop is currently bound and reading.
#[derive(Debug, Default)]
pub struct ConsumerStatus {
    running: AtomicBool,
}

impl ConsumerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub topology: BrokerTopology,
    /// Durable consumer name
    pub queue: String,
    /// Routing keys to bind; `*` acts as a single-token wildcard
    pub routing_keys: Vec<String>,
}

impl ConsumerSettings {
    pub fn filter_subjects(&self) -> Vec<String> {
        self.routing_keys
            .iter()
            .map(|key| self.topology.subject_for(key))
            .collect()
    }
}

/// Route one delivery by its subject.
pub async fn handle_delivery(
    router: &NotificationRouter,
    topology: &BrokerTopology,
    subject: &str,
    payload: &[u8],
) -> Disposition {
    let routing_key = topology.routing_key(subject);
    debug!(subject, routing_key, "received message");
    router.route(routing_key, payload).await
}

async fn bind_consumer(js: &jetstream::Context, settings: &ConsumerSettings) -> Result<PullConsumer> {
    let topology = &settings.topology;
    ensure_stream(js, topology).await;

    let stream = js
        .get_stream(&topology.stream_name)
        .await
        .with_context(|| format!("Stream {} is not available", topology.stream_name))?;

    let consumer = if topology.declare {
        stream
            .get_or_create_consumer(
                &settings.queue,
                pull::Config {
                    durable_name: Some(settings.queue.clone()),
                    filter_subjects: settings.filter_subjects(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to declare consumer {}", settings.queue))?
    } else {
        stream
            .get_consumer(&settings.queue)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Consumer {} does not exist", settings.queue))?
    };

    Ok(consumer)
}

/// Consume until `shutdown` resolves or the message stream ends.
pub async fn run_consumer<F>(
    client: async_nats::Client,
    settings: ConsumerSettings,
    router: NotificationRouter,
    status: Arc<ConsumerStatus>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let js = jetstream::new(client);
    let consumer = bind_consumer(&js, &settings).await?;
    let mut messages = consumer
        .messages()
        .await
        .context("Failed to start consuming")?;

    info!(
        queue = %settings.queue,
        subjects = ?settings.filter_subjects(),
        "notifications consumer started"
    );

    status.set_running(true);
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested, stopping consumer");
                break;
            }
            next = messages.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(error = %e, "error receiving message");
                continue;
            }
            None => {
                warn!("message stream ended");
                break;
            }
        };

        let subject = message.subject.to_string();
        let disposition =
            handle_delivery(&router, &settings.topology, &subject, &message.payload).await;

        let acked = match disposition {
            Disposition::Ack => message.ack().await,
            Disposition::Reject => message.ack_with(AckKind::Term).await,
        };
        if let Err(e) = acked {
            warn!(%subject, ?disposition, error = %e, "failed to acknowledge message");
        }
    }

    status.set_running(false);
    Ok(())
}
