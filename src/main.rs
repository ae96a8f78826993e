mod channels;
mod db;
mod delivery;
mod device;
mod error;
mod notification;
mod preference;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Context;
use channels::{
    ChannelSender, EmailConfig, EmailSender, PushGatewayConfig, PushSender, SmsGatewayConfig, SmsSender,
};
use db::{create_pool, run_migrations};
use delivery::start_sweep_service;
use routes::create_router;
use state::{AppState, Config, Repositories, StorageBackend};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,notification_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let repositories = match config.storage {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres storage backend")?;

            tracing::info!("Connecting to database...");
            let db = create_pool(database_url, config.database_max_connections).await?;

            tracing::info!("Running migrations...");
            run_migrations(&db).await?;

            Repositories::postgres(db)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; notifications are lost on restart");
            Repositories::in_memory()
        }
    };

    let state = AppState::new(&config, repositories, channel_senders()?);

    // Start the sweep and cleanup jobs
    let _scheduler = start_sweep_service(state.sweeper.clone(), &config.sweep_cron, &config.cleanup_cron)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start sweep service: {:?}", e))?;

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// External channel senders for every provider configured in the environment.
fn channel_senders() -> anyhow::Result<Vec<Arc<dyn ChannelSender>>> {
    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();

    match PushGatewayConfig::from_env() {
        Some(config) => senders.push(Arc::new(PushSender::new(config)?)),
        None => tracing::warn!("PUSH_GATEWAY_URL not set, push delivery disabled"),
    }
    match SmsGatewayConfig::from_env() {
        Some(config) => senders.push(Arc::new(SmsSender::new(config)?)),
        None => tracing::warn!("SMS_GATEWAY_URL not set, SMS delivery disabled"),
    }
    match EmailConfig::from_env()? {
        Some(config) => senders.push(Arc::new(EmailSender::new(config)?)),
        None => tracing::warn!("SMTP_HOST not set, email delivery disabled"),
    }

    for sender in &senders {
        tracing::info!(channel = %sender.channel(), "Channel sender configured");
    }
    Ok(senders)
}
