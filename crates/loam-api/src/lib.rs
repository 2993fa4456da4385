//! Reference document service for Loam sync.
//!
//! Serves JSON documents under `/v1/docs/{path}` with ETag preconditions so
//! any Loam client can run against it.

pub mod config;
pub mod documents;
pub mod error;
pub mod routes;

use std::future::Future;

pub use config::{AppConfig, ConfigError};
pub use routes::{app_router, AppState};

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
