use loam_core::MutationKind;

use crate::commands::common::{open_engine, parse_record, CliContext, OpenEngineMode};
use crate::error::CliError;

pub async fn run_record(
    ctx: &CliContext,
    kind: MutationKind,
    collection: &str,
    id: &str,
    raw_value: &str,
) -> Result<(), CliError> {
    let value = parse_record(raw_value)?;
    let engine = open_engine(ctx, OpenEngineMode::Local).await?;
    let entry_id = engine
        .enqueue_mutation(&ctx.profile, kind, collection, id, value)
        .await?;

    println!("{entry_id}");
    Ok(())
}
