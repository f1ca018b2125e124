use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use courier::{create_router, init_tracing, AppState, Config};
use courier_db::{init_pool, run_migrations, SqliteEventLog};
use courier_dispatch::{AnySender, Dispatcher};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: COURIER_ENV (local|dev|prod), DATABASE_URL, LISTEN_ADDR");
            eprintln!("Optional: COURIER_TICK_INTERVAL_MS, COURIER_SENDER_URL, COURIER_SEND_TIMEOUT_MS");
            eprintln!("Optional: COURIER_MAX_ATTEMPTS, COURIER_BACKOFF_BASE_MS, COURIER_BACKOFF_MAX_MS");
            std::process::exit(1);
        }
    };

    init_tracing(config.env);

    tracing::info!(env = ?config.env, "Starting courier");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database: {}", config.database_url);

    // Connect to database
    let pool = match init_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database connection error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        tracing::error!("Migration error: {}", e);
        std::process::exit(1);
    }

    let event_log = Arc::new(SqliteEventLog::new(pool));

    let sender = AnySender::from_endpoint(config.sender_url.as_deref());
    tracing::info!("Sender: {}", sender.describe());

    // Start the dispatcher; it stops when `cancel` fires
    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(event_log.clone(), Arc::new(sender), config.dispatcher.clone());
    let dispatcher = dispatcher.start(cancel.clone());

    let state = AppState::new(event_log, dispatcher.stats());
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", config.listen_addr, e);
            dispatcher.stop().await;
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.listen_addr);

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await;
    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
    }

    dispatcher.stop().await;
    tracing::info!("Courier stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
