// Main entry point for the auth API server

use std::sync::Arc;

use anyhow::{Context, Result};
use auth_core::{
    domains::auth::{PostgresAuthStore, TokenService},
    kernel::{
        start_scheduler, BrokerConnection, JetStreamConnector, NatsEventPublisher,
        RegistrationSettings, RegistryAdapter, ScheduleSettings, ServerDeps,
    },
    mask_connection_string,
    server::build_app,
    Config,
};
use identity_registry::{RegistryOptions, RegistryService};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,auth_core=debug,identity_registry=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Carpeta Ciudadana auth service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        database = %mask_connection_string(&config.database_url),
        nats = %mask_connection_string(&config.broker.nats_url),
        identity_service = %config.identity_service_url,
        "Configuration loaded"
    );

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let store = Arc::new(PostgresAuthStore::new(pool).with_timeout(config.store_timeout));

    let registry = RegistryService::new(RegistryOptions {
        base_url: config.identity_service_url.clone(),
        timeout: config.identity_timeout,
    })
    .context("Failed to build identity registry client")?;

    // Broker link is lazy; a failed first connect is retried on publish.
    let connection = Arc::new(BrokerConnection::new(Arc::new(JetStreamConnector::new(
        config.broker.topology(),
    ))));
    if let Err(e) = connection.connect().await {
        tracing::warn!(error = %e, "Broker unavailable at startup, will retry on publish");
    }
    let events = Arc::new(NatsEventPublisher::new(
        connection,
        config.broker.topology(),
        "auth-service".to_string(),
    ));

    let tokens = Arc::new(TokenService::new(
        &config.jwt_secret,
        config.jwt_issuer.clone(),
        config.session_ttl,
    ));

    let deps = Arc::new(ServerDeps::new(
        store.clone(),
        Arc::new(RegistryAdapter::new(Arc::new(registry))),
        events,
        tokens,
        RegistrationSettings {
            frontend_base_url: config.frontend_base_url.clone(),
            pending_ttl: config.pending_token_ttl,
            identity_timeout: config.identity_timeout,
        },
    ));

    // Scheduled tasks (session cleanup, registration reconciliation)
    let mut scheduler = start_scheduler(
        store,
        ScheduleSettings {
            cleanup_schedule: config.cleanup_schedule.clone(),
            orphan_grace: config.orphan_grace,
        },
    )
    .await
    .context("Failed to start scheduled tasks")?;

    let app = build_app(deps, &config.allowed_origins);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
