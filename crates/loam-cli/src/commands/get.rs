use crate::commands::common::{format_timestamp, open_engine, render_value, CliContext, OpenEngineMode};
use crate::error::CliError;

pub async fn run_get(ctx: &CliContext, category: &str, as_json: bool) -> Result<(), CliError> {
    let engine = open_engine(ctx, OpenEngineMode::Local).await?;
    let Some(envelope) = engine.category(&ctx.profile, category).await? else {
        if as_json {
            println!("null");
        } else {
            println!("No value stored for `{category}`.");
        }
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    println!("{}", render_value(&envelope.value)?);
    let synced = envelope
        .synced_at
        .map_or_else(|| "never".to_string(), format_timestamp);
    println!(
        "modified {}  synced {}{}",
        format_timestamp(envelope.modified_at),
        synced,
        if envelope.changed_since_sync() { "  (unsynced)" } else { "" }
    );
    Ok(())
}
