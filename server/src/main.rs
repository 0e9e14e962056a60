use anyhow::Context;
use clinic_server::config::AppConfig;
use clinic_server::database::Database;
use clinic_server::migrations::run_migrations;
use clinic_server::routes::router;
use clinic_server::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;

    if config.run_migrations {
        run_migrations(&pool, &config.migrations_dir).await?;
    }

    let db = Arc::new(Database::new(pool));
    let state = AppState::new(db, config.session_ttl(), config.password_iterations);

    if let Some((email, password)) = &config.bootstrap_superadmin {
        match state.users.bootstrap_superadmin(email, password).await {
            Ok(Some(id)) => tracing::info!("Superadmin {} ready", id),
            Ok(None) => tracing::debug!("Superadmin already present, bootstrap skipped"),
            Err(e) => tracing::warn!("Superadmin bootstrap failed: {}", e),
        }
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Clinic server running on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
