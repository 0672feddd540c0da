use std::sync::Arc;

use authflow::{
    app::{build_app, serve},
    config::AppConfig,
    db::ConnectionManager,
    state::AppState,
    users::PgUserStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);
    let production = config.environment.is_production();

    let default_filter = if production {
        "authflow=info,axum=info,tower_http=info"
    } else {
        "authflow=debug,axum=info,tower_http=info"
    };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(production);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    if config.uses_dev_jwt_secret() {
        tracing::warn!("JWT_SECRET not set; using the development fallback secret");
    }

    let db = ConnectionManager::connect(&config.database, !production)?;

    // Run migrations if present
    if let Err(e) = sqlx::migrate!("./migrations").run(db.pool()).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }

    match db.ping().await {
        Ok(()) => tracing::info!("database connection established"),
        Err(e) => tracing::error!(error = %e, "database connection test failed; continuing"),
    }

    let users = Arc::new(PgUserStore::new(db.clone()));
    let state = AppState::from_parts(config.clone(), users)?;
    let app = build_app(state)?;

    let served = serve(app, &config).await;
    db.close().await;
    served
}
