use std::sync::Arc;

use loam_api::{serve, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    let directive: tracing_subscriber::filter::Directive = "loam_api=info".parse()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting loam-api with config: {:?}", config);

    let state = AppState::from_config(config);
    let bind_addr = state.config.bind_addr.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("loam-api listening on {}", bind_addr);
    serve(listener, state, async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for shutdown signal: {error}");
        }
        tracing::info!("Shutting down");
    })
    .await?;
    Ok(())
}
