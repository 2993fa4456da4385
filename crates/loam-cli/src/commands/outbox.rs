use loam_core::EntryId;

use crate::commands::common::{
    format_outbox_lines, open_engine, outbox_to_item, CliContext, OpenEngineMode, OutboxItem,
};
use crate::error::CliError;

pub async fn run_outbox_list(ctx: &CliContext, as_json: bool) -> Result<(), CliError> {
    let engine = open_engine(ctx, OpenEngineMode::Local).await?;
    let entries = engine.outbox().await?;

    if as_json {
        let json_items = entries.iter().map(outbox_to_item).collect::<Vec<OutboxItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for line in format_outbox_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_outbox_retry(ctx: &CliContext, id: &str) -> Result<(), CliError> {
    let entry_id = parse_entry_id(id)?;
    let engine = open_engine(ctx, OpenEngineMode::Local).await?;
    engine.retry_entry(entry_id).await?;

    println!("Requeued {entry_id}");
    Ok(())
}

pub fn parse_entry_id(raw: &str) -> Result<EntryId, CliError> {
    raw.trim()
        .parse::<EntryId>()
        .map_err(|_| CliError::InvalidEntryId(raw.trim().to_string()))
}
