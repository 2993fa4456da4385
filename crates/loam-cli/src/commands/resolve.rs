use std::collections::BTreeMap;

use loam_core::Resolution;

use crate::commands::common::{format_conflict_lines, open_engine, CliContext, OpenEngineMode};
use crate::error::CliError;

pub async fn run_resolve(ctx: &CliContext, raw: &[String]) -> Result<(), CliError> {
    let resolutions = parse_resolutions(raw)?;
    let engine = open_engine(ctx, OpenEngineMode::RequireRemote).await?;
    let result = engine.resolve_conflicts(&ctx.profile, &resolutions).await?;

    for line in format_conflict_lines(&result.conflicts) {
        println!("{line}");
    }
    if let Some(error) = result.error {
        return Err(CliError::SyncFailed(error));
    }
    Ok(())
}

pub fn parse_resolutions(raw: &[String]) -> Result<BTreeMap<String, Resolution>, CliError> {
    raw.iter()
        .map(|item| {
            let (category, resolution) = item
                .split_once('=')
                .ok_or_else(|| CliError::InvalidResolution(item.clone()))?;
            let category = category.trim();
            if category.is_empty() {
                return Err(CliError::InvalidResolution(item.clone()));
            }
            let resolution = resolution
                .parse::<Resolution>()
                .map_err(|_| CliError::InvalidResolution(item.clone()))?;
            Ok((category.to_string(), resolution))
        })
        .collect()
}
