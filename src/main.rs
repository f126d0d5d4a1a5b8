use splitledger::config::CONFIG;
use splitledger::{InMemoryActivityLog, InMemoryStorage, LedgerService, app};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&CONFIG.log_level)))
        .init();
    info!(config = ?*CONFIG, "starting splitledger");

    // Initialize storage and logging
    let storage = InMemoryStorage::new();
    let logging = InMemoryActivityLog::new();
    let service = Arc::new(
        LedgerService::new(storage, logging, CONFIG.jwt_secret.clone())
            .with_require_auth(CONFIG.require_auth)
            .with_forced_list_error(CONFIG.force_list_error),
    );

    let app = app(service)
        .layer(CompressionLayer::new()) // Gzip compression
        .layer(TimeoutLayer::new(CONFIG.request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                ])
                .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http()); // Request tracing

    // Start server
    let addr: SocketAddr = format!("{}:{}", CONFIG.host, CONFIG.port).parse()?;
    info!("Server running at http://{}", addr);
    info!("Swagger UI at http://{}/swagger-ui", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
