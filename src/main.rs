//! Vigil - uptime monitoring and alerting
//!
//! Probes web endpoints, watches reporting nodes for silence and notifies a
//! Telegram chat when something goes down or comes back.

mod config;
mod db;
mod error;
mod notify;
mod ordering;
mod probe;
mod report;
mod scheduler;
#[cfg(test)]
mod testutil;
mod web;

use config::ServerConfig;
use db::Store;
use notify::{Dispatcher, TelegramSender};
use probe::HttpProber;
use scheduler::{Scheduler, TickSettings};
use web::Server;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long queued notifications may take to flush on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("vigil=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting vigil on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Notification delivery
    let sender = TelegramSender::new(cfg.telegram_api_base.clone())?;
    let (dispatcher, delivery) = Dispatcher::start(store.clone(), sender);

    // Start scheduler
    let prober = HttpProber::new(cfg.probe_timeout)?;
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        prober,
        dispatcher.clone(),
        TickSettings::from(&cfg),
    ));
    scheduler.start().await;

    // Start web server
    let server = Server::new(cfg, store, dispatcher);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown requested");
    };
    let served = server.start(shutdown).await;

    scheduler.stop().await;
    // The delivery worker exits once the last dispatcher handle is gone.
    drop(scheduler);
    if tokio::time::timeout(DRAIN_TIMEOUT, delivery).await.is_err() {
        tracing::warn!("Pending notifications not delivered within {:?}", DRAIN_TIMEOUT);
    }

    served
}
