//! Page Keeper - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use pagekeeper_backend::{
    api,
    config::Config,
    db,
    error::{AppError, Result},
    services::{mailer::LogMailer, metrics_service},
    store::Stores,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _otel_guard = telemetry::init_tracing(config.otel_endpoint.as_deref(), &config.otel_service_name);
    tracing::info!("Starting Page Keeper");

    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    db::run_migrations(&db_pool).await?;
    tracing::info!("Database migrations complete");

    let cors = cors_layer(config.cors_origins.as_deref())?;
    let addr: SocketAddr = config.bind_address.parse()?;

    let mut app_state = api::AppState::new(config, Stores::postgres(db_pool), Arc::new(LogMailer));

    // Provision the first super admin when none exists
    app_state.users.provision_super_admin().await?;

    let metrics_handle = metrics_service::init_metrics()?;
    tracing::info!("Prometheus metrics recorder initialized");
    app_state.set_metrics_handle(metrics_handle);

    let app = api::routes::create_router(Arc::new(app_state)).layer(cors);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Explicit origins when `CORS_ORIGINS` is set, permissive otherwise.
fn cors_layer(origins: Option<&str>) -> Result<CorsLayer> {
    let Some(origins) = origins else {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    };

    let origins = origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<HeaderValue>()
                .map_err(|_| AppError::Config(format!("Invalid CORS origin: {}", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
