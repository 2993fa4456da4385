use std::collections::BTreeSet;

use loam_core::SyncPreferences;

use crate::commands::common::{format_timestamp, open_engine, CliContext, OpenEngineMode};
use crate::error::CliError;

pub async fn run_prefs_show(ctx: &CliContext, as_json: bool) -> Result<(), CliError> {
    let engine = open_engine(ctx, OpenEngineMode::Local).await?;
    let preferences = engine.preferences(&ctx.profile).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&preferences)?);
    } else {
        for line in format_preferences(&ctx.profile, &preferences) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_prefs_set(
    ctx: &CliContext,
    auto_sync: Option<bool>,
    manual_only: Option<bool>,
    categories: Option<Vec<String>>,
) -> Result<(), CliError> {
    if auto_sync.is_none() && manual_only.is_none() && categories.is_none() {
        return Err(CliError::Config(
            "nothing to change; pass --auto-sync, --manual-only or --categories".to_string(),
        ));
    }

    let categories = categories.map(normalize_categories);
    let engine = open_engine(ctx, OpenEngineMode::Local).await?;
    let preferences = engine
        .update_preferences(&ctx.profile, move |preferences| {
            if let Some(auto_sync) = auto_sync {
                preferences.auto_sync = auto_sync;
            }
            if let Some(manual_only) = manual_only {
                preferences.manual_only = manual_only;
            }
            if let Some(categories) = categories {
                preferences.selected_categories = categories;
            }
        })
        .await?;

    for line in format_preferences(&ctx.profile, &preferences) {
        println!("{line}");
    }
    Ok(())
}

pub fn normalize_categories(raw: Vec<String>) -> BTreeSet<String> {
    raw.into_iter()
        .map(|category| category.trim().to_string())
        .filter(|category| !category.is_empty())
        .collect()
}

pub fn format_preferences(profile: &str, preferences: &SyncPreferences) -> Vec<String> {
    let categories = if preferences.selected_categories.is_empty() {
        "(none)".to_string()
    } else {
        preferences
            .selected_categories
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let last_sync = preferences
        .last_sync
        .map_or_else(|| "never".to_string(), format_timestamp);

    vec![
        format!("profile          {profile}"),
        format!("auto sync        {}", preferences.auto_sync),
        format!("manual only      {}", preferences.manual_only),
        format!("categories       {categories}"),
        format!("status           {}", preferences.sync_status),
        format!("pending changes  {}", preferences.pending_changes),
        format!("last sync        {last_sync}"),
    ]
}
