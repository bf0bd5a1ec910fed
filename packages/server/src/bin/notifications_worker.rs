// Notifications worker: consumes auth events and sends emails

use std::sync::Arc;

use anyhow::{Context, Result};
use auth_core::{
    domains::notifications::{
        run_consumer, ConsumerSettings, ConsumerStatus, NotificationRouter, NotificationSettings,
    },
    kernel::{BaseEmailGateway, ConsoleEmailGateway, HttpEmailGateway},
    mask_connection_string,
    server::{build_worker_app, WorkerState},
    WorkerConfig,
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,auth_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        nats = %mask_connection_string(&config.broker.nats_url),
        queue = %config.queue_name,
        routing_keys = ?config.routing_keys,
        test_mode = config.email_test_mode,
        "Starting notifications worker"
    );

    let email: Arc<dyn BaseEmailGateway> = match (&config.email_relay_url, config.email_test_mode) {
        (Some(relay_url), false) => Arc::new(
            HttpEmailGateway::new(relay_url.clone(), config.email_timeout)
                .context("Failed to build email gateway")?,
        ),
        _ => Arc::new(ConsoleEmailGateway),
    };

    let settings = NotificationSettings {
        sender: config.email_sender.clone(),
        login_url: config.login_url.clone(),
    };
    let status = Arc::new(ConsumerStatus::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api = match config.listen_port {
        Some(port) => {
            let app = build_worker_app(WorkerState {
                email: email.clone(),
                settings: settings.clone(),
                consumer: status.clone(),
            });
            let addr = format!("0.0.0.0:{}", port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            tracing::info!("Serving email API on {}", addr);

            let mut api_shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = api_shutdown.wait_for(|stop| *stop).await;
                    })
                    .await
            }))
        }
        None => None,
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        let _ = shutdown_tx.send(true);
    });

    let router = NotificationRouter::new(email, settings);

    let client = async_nats::connect(&config.broker.nats_url)
        .await
        .context("Failed to connect to NATS")?;

    run_consumer(
        client,
        ConsumerSettings {
            topology: config.broker.topology(),
            queue: config.queue_name.clone(),
            routing_keys: config.routing_keys.clone(),
        },
        router,
        status,
        async move {
            let mut consumer_shutdown = shutdown_rx;
            let _ = consumer_shutdown.wait_for(|stop| *stop).await;
        },
    )
    .await?;

    if let Some(api) = api {
        api.await
            .context("Email API task panicked")?
            .context("Email API server failed")?;
    }

    tracing::info!("Notifications worker stopped");
    Ok(())
}
