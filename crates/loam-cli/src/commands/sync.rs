use loam_core::SyncResult;

use crate::commands::common::{format_conflict_lines, open_engine, CliContext, OpenEngineMode};
use crate::error::CliError;

pub async fn run_sync(ctx: &CliContext, as_json: bool) -> Result<(), CliError> {
    let engine = open_engine(ctx, OpenEngineMode::RequireRemote).await?;
    let result = engine.manual_sync(&ctx.profile).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in summary_lines(&result) {
            println!("{line}");
        }
    }

    match result.error {
        Some(error) => Err(CliError::SyncFailed(error)),
        None => Ok(()),
    }
}

pub fn summary_lines(result: &SyncResult) -> Vec<String> {
    let mut lines = Vec::new();
    if result.success {
        lines.push("Sync completed".to_string());
    } else if result.error.is_none() {
        lines.push("Sync finished with unresolved conflicts".to_string());
    }

    if !result.synced_categories.is_empty() {
        lines.push(format!("Synced: {}", result.synced_categories.join(", ")));
    }

    let outbox = &result.outbox;
    if outbox.applied > 0 || outbox.remaining > 0 {
        lines.push(format!(
            "Outbox: {} applied, {} remaining",
            outbox.applied, outbox.remaining
        ));
    }
    for failure in &outbox.failures {
        lines.push(format!(
            "Rejected {} ({}): {}",
            failure.target, failure.entry_id, failure.message
        ));
    }

    if !result.conflicts.is_empty() {
        lines.push("Conflicts:".to_string());
        lines.extend(
            format_conflict_lines(&result.conflicts)
                .into_iter()
                .map(|line| format!("  {line}")),
        );
        lines.push("Resolve with `loam resolve <category>=<local|remote|merge>`".to_string());
    }
    lines
}
