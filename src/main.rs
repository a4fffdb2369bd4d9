use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use paytrail::config::Config;
use paytrail::db::{create_pool, init_db, queries, AppState};
use paytrail::handlers;

#[derive(Parser, Debug)]
#[command(name = "paytrail")]
#[command(about = "First-party event attribution and payment reconciliation service")]
struct Cli {
    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Spawns a background task that periodically purges webhook delivery dedup
/// rows past their retention window. Providers retry for days at most, so
/// old rows only cost space.
fn spawn_purge_task(state: AppState) {
    let retention_days = state.config.webhook_delivery_retention_days;
    if retention_days <= 0 {
        return;
    }

    tokio::spawn(async move {
        let interval = Duration::from_secs(6 * 60 * 60); // 6 hours

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => match queries::purge_old_webhook_deliveries(&conn, retention_days) {
                    Ok(count) => {
                        if count > 0 {
                            tracing::debug!("Purged {} old webhook delivery records", count);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to purge webhook deliveries: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to get db connection for purge: {}", e);
                }
            }
        }
    });

    tracing::info!("Background purge task started (runs every 6 hours)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paytrail=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.skip_webhook_verify {
        tracing::warn!("WEBHOOK SIGNATURE VERIFICATION DISABLED - dev override active");
    }
    if config.scheduler_secret.is_none() {
        tracing::warn!("PAYTRAIL_SCHEDULER_SECRET not set - scheduler endpoint disabled");
    }
    if config.admin_secret.is_none() {
        tracing::warn!("PAYTRAIL_ADMIN_SECRET not set - admin endpoints disabled");
    }

    // Create database connection pool and initialize schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let rate_limit = config.rate_limit;
    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let addr = config.addr();

    let state = AppState::new(db_pool, config);

    // Start background purge of old webhook delivery records
    spawn_purge_task(state.clone());

    // Build the application router
    let app = Router::new()
        // Public endpoints (rate limited per IP)
        .merge(handlers::public_router(rate_limit))
        // Webhook endpoints (provider signature auth)
        .merge(handlers::webhooks::router())
        // Scheduler trigger + admin surface (shared-secret auth)
        .merge(handlers::ops_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("paytrail server listening on {}", addr);

    // Run server with graceful shutdown.
    // Use into_make_service_with_connect_info to enable IP-based rate limiting.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // Cleanup on exit if ephemeral mode
    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
