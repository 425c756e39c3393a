//! services/api/src/bin/api.rs
//!
//! Entry point of the watch-progress HTTP service.

use api_lib::{
    adapters::DbAdapter,
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use watch_progress_core::ProgressService;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Arc::new(Config::from_env()?);
    init_tracing(&config);

    let db = Arc::new(connect(&config).await?);

    // Postgres backs the progress store, the catalog view and the session table.
    let app_state = Arc::new(AppState {
        progress: ProgressService::new(db.clone(), db.clone()),
        identity: db,
        config: config.clone(),
    });

    let app = Router::new()
        .merge(router(app_state).layer(cors_layer(&config)?))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    info!(
        "Watch progress API listening on {} (docs at /swagger-ui)",
        config.bind_address
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn connect(config: &Config) -> Result<DbAdapter, ApiError> {
    info!(
        "Opening Postgres pool (max {} connections)",
        config.db_max_connections
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    let db = DbAdapter::new(pool);
    db.run_migrations().await?;
    info!("Migrations applied.");
    Ok(db)
}

/// Browsers send the session cookie only to an explicitly allowed origin.
fn cors_layer(config: &Config) -> Result<CorsLayer, ApiError> {
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]))
}
