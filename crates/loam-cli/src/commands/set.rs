use crate::commands::common::{open_engine, parse_value, CliContext, OpenEngineMode};
use crate::error::CliError;

pub async fn run_set(ctx: &CliContext, category: &str, raw_value: &str) -> Result<(), CliError> {
    let value = parse_value(raw_value)?;
    let engine = open_engine(ctx, OpenEngineMode::Local).await?;
    engine.save_category(&ctx.profile, category, value).await?;

    let preferences = engine.preferences(&ctx.profile).await?;
    println!(
        "Saved {category} ({} pending change{})",
        preferences.pending_changes,
        if preferences.pending_changes == 1 { "" } else { "s" }
    );
    if !preferences.selected_categories.contains(category.trim()) {
        println!("Note: `{category}` is not selected for sync; see `loam prefs set --categories`");
    }
    Ok(())
}
