use std::time::Duration;

use loam_core::EngineConfig;

use crate::commands::common::{open_engine_with_config, CliContext, OpenEngineMode};
use crate::error::CliError;

pub async fn run_watch(ctx: &CliContext, interval_secs: Option<u64>) -> Result<(), CliError> {
    let mut config = EngineConfig::default();
    if let Some(secs) = interval_secs {
        config = config.with_sync_interval(Duration::from_secs(secs));
    }

    let engine = open_engine_with_config(ctx, OpenEngineMode::RequireRemote, config).await?;
    let preferences = engine.preferences(&ctx.profile).await?;
    if !preferences.allows_automatic_sync() {
        println!(
            "Automatic sync is disabled for `{}`; enable it with `loam prefs set --auto-sync true --manual-only false`",
            ctx.profile
        );
    }

    println!(
        "Watching `{}` every {}s; press Ctrl-C to stop",
        ctx.profile,
        engine.config().sync_interval.as_secs()
    );
    let handle = engine.start_background();
    tokio::signal::ctrl_c().await?;
    tracing::info!("Stopping background sync");
    handle.shutdown().await;
    Ok(())
}
