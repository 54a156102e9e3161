// Split Ledger - Web Server
// Serves the expense API over an explicitly opened SQLite store

use anyhow::{Context, Result};
use split_ledger::{api, ExpenseService, Settings, SqliteStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::new().context("Failed to load settings")?;

    let store = Arc::new(
        SqliteStore::open(&settings.database.path)
            .with_context(|| format!("Failed to open database: {}", settings.database.path))?,
    );
    let service = ExpenseService::new(store.clone(), store, settings.calculator());

    let app = api::router(service);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.server.bind))?;

    info!(addr = %settings.server.bind, "server running");
    info!("API: http://{}/api/expenses/overall", settings.server.bind);

    axum::serve(listener, app).await.context("Server stopped")?;

    Ok(())
}
