//! ChatCast - Campaign delivery server entry point

use anyhow::Result;
use chatcast_api::AppState;
use chatcast_common::config::Config;
use chatcast_core::campaign::UnmeteredGate;
use chatcast_core::gateway::CloudApiFactory;
use chatcast_core::{CampaignService, DeliveryExecutor, StatusReconciler};
use chatcast_storage::db::DatabasePool;
use chatcast_storage::repository::ChannelRepository;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting ChatCast server...");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    let pool = db_pool.pool().clone();

    // Wire the delivery pipeline
    let gateway = Arc::new(CloudApiFactory::new(&config.gateway)?);
    let executor = DeliveryExecutor::new(pool.clone(), gateway, &config.gateway);
    let campaigns = CampaignService::new(pool.clone(), executor, Arc::new(UnmeteredGate));
    let reconciler = StatusReconciler::new(pool.clone());

    let state = Arc::new(AppState {
        db_pool: db_pool.clone(),
        campaigns,
        reconciler,
        channels: ChannelRepository::new(pool),
    });

    // Start API server
    let api_handle = {
        let state = state.clone();
        let bind_address = config.server.bind_address.clone();
        let api_port = config.api.port;
        tokio::spawn(async move {
            let app = chatcast_api::create_router(state);
            let listener =
                match tokio::net::TcpListener::bind(format!("{}:{}", bind_address, api_port)).await
                {
                    Ok(listener) => listener,
                    Err(e) => {
                        tracing::error!("Failed to bind API server: {}", e);
                        return;
                    }
                };
            info!("Starting API server on port {}", api_port);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("ChatCast server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();

    info!("ChatCast server shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chatcast=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
