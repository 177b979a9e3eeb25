//! SplitLedger API - shared expense allocation and settlement
//!
//! Groups propose expenses, split them into exact integer-cent shares,
//! approve them unanimously and settle the resulting debts through a
//! pairwise ledger. Group activity views run an idempotent reconciliation
//! pass that repairs anything a crash left half-done.

mod auth;
mod config;
mod db;
mod error;
mod expense;
mod models;
mod notify;
mod routes;
mod state;
mod store;

use crate::config::{Settings, StorageBackend};
use crate::notify::{spawn_dispatcher, ChannelNotifier};
use crate::routes::create_router;
use crate::state::AppState;
use crate::store::{ExpenseRepository, MemoryExpenseRepository, PgExpenseRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("Starting SplitLedger API...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let repo = init_repository(&settings).await?;

    // Fire-and-forget notification fan-out
    let (notifier, events) = ChannelNotifier::new(settings.notifications.buffer);
    let dispatcher = spawn_dispatcher(events);

    let state = Arc::new(AppState::new(
        repo,
        Arc::new(notifier),
        settings.auth.jwt_secret.clone(),
    ));

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("API Endpoints:");
    info!("   POST   /api/allocations/preview          - Preview a weighted split");
    info!("   POST   /api/allocations/itemized         - Split receipt line items");
    info!("   POST   /api/groups/{{id}}/expenses         - Propose an expense");
    info!("   GET    /api/groups/{{id}}/expenses         - List a group's expenses");
    info!("   GET    /api/groups/{{id}}/activity         - Reconcile, then list");
    info!("   POST   /api/groups/{{id}}/reconcile        - Run the repair pass");
    info!("   GET    /api/expenses/{{id}}                - Expense, shares and ledger");
    info!("   POST   /api/expenses/{{id}}/approve        - Approve your share");
    info!("   POST   /api/expenses/{{id}}/decline        - Withdraw your approval");
    info!("   DELETE /api/expenses/{{id}}                - Delete (creator only)");
    info!("   GET    /api/balances/{{a}}/{{b}}             - Net balance between two users");
    info!("   GET    /api/users/{{id}}/balances          - Balances per counterpart");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Give the dispatcher a moment to drain what is already queued
    match tokio::time::timeout(Duration::from_secs(5), dispatcher).await {
        Ok(Err(e)) => warn!("Notification dispatcher ended abnormally: {}", e),
        Err(_) => warn!("Notification dispatcher still busy at shutdown"),
        Ok(Ok(())) => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,splitledger_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Build the configured storage backend
async fn init_repository(settings: &Settings) -> anyhow::Result<Arc<dyn ExpenseRepository>> {
    match settings.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; all data is lost on shutdown");
            Ok(Arc::new(MemoryExpenseRepository::new()))
        }
        StorageBackend::Postgres => {
            let pool = db::create_pool(&settings.database).map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            db::init_schema(&pool).await?;
            info!(
                "Database ready at {}:{}/{} (TLS: {})",
                settings.database.host,
                settings.database.port,
                settings.database.database,
                settings.database.use_tls
            );
            Ok(Arc::new(PgExpenseRepository::new(pool)))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
