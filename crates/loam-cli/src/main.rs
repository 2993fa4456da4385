//! Loam CLI - drive the offline-first sync engine from the terminal
//!
//! Local edits work without a network; `sync` and `watch` reconcile them with
//! the document service.

mod cli;
mod commands;
mod error;

use clap::Parser;
use loam_core::MutationKind;

use crate::cli::{Cli, Commands, OutboxCommands, PrefsCommands, RecordCommands};
use crate::commands::common::{resolve_db_path, CliContext};
use crate::commands::completions::run_completions;
use crate::commands::get::run_get;
use crate::commands::outbox::{run_outbox_list, run_outbox_retry};
use crate::commands::prefs::{run_prefs_set, run_prefs_show};
use crate::commands::record::run_record;
use crate::commands::resolve::run_resolve;
use crate::commands::set::run_set;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: tracing_subscriber::filter::Directive = "loam=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let ctx = CliContext {
        db_path: resolve_db_path(cli.db_path)?,
        profile: cli.profile,
        remote_url: cli.remote_url,
    };

    match cli.command {
        Commands::Set { category, value } => run_set(&ctx, &category, &value).await?,
        Commands::Get { category, json } => run_get(&ctx, &category, json).await?,
        Commands::Record { command } => match command {
            RecordCommands::Create {
                collection,
                id,
                value,
            } => run_record(&ctx, MutationKind::Create, &collection, &id, &value).await?,
            RecordCommands::Patch {
                collection,
                id,
                value,
            } => run_record(&ctx, MutationKind::Patch, &collection, &id, &value).await?,
        },
        Commands::Outbox { command } => match command {
            OutboxCommands::List { json } => run_outbox_list(&ctx, json).await?,
            OutboxCommands::Retry { id } => run_outbox_retry(&ctx, &id).await?,
        },
        Commands::Sync { json } => run_sync(&ctx, json).await?,
        Commands::Resolve { resolutions } => run_resolve(&ctx, &resolutions).await?,
        Commands::Prefs { command } => match command {
            PrefsCommands::Show { json } => run_prefs_show(&ctx, json).await?,
            PrefsCommands::Set {
                auto_sync,
                manual_only,
                categories,
            } => run_prefs_set(&ctx, auto_sync, manual_only, categories).await?,
        },
        Commands::Watch { interval } => run_watch(&ctx, interval).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
