use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "loam")]
#[command(about = "Offline-first profile sync from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Profile whose documents and preferences are used
    #[arg(long, global = true, value_name = "NAME", default_value = "default")]
    pub profile: String,

    /// Base URL of the document service (overrides LOAM_REMOTE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub remote_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a category value locally
    Set {
        /// Category name
        category: String,
        /// JSON value (bare text is stored as a string)
        value: String,
    },
    /// Show a locally stored category
    Get {
        /// Category name
        category: String,
        /// Output the full envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue a record mutation for the remote
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Inspect or retry queued mutations
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
    /// Run one sync cycle now
    Sync {
        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settle conflicting categories: <category>=<local|remote|merge>
    Resolve {
        #[arg(required = true, value_name = "CATEGORY=RESOLUTION")]
        resolutions: Vec<String>,
    },
    /// Show or change sync preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
    /// Sync in the background until interrupted
    Watch {
        /// Seconds between automatic cycles
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Create a record
    Create {
        collection: String,
        id: String,
        /// Record body as JSON
        value: String,
    },
    /// Replace an existing record
    Patch {
        collection: String,
        id: String,
        /// Record body as JSON
        value: String,
    },
}

#[derive(Subcommand)]
pub enum OutboxCommands {
    /// List queued mutations in dispatch order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Requeue an entry the remote rejected
    Retry {
        /// Outbox entry id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Show preferences and sync status
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change preferences
    Set {
        /// Enable background sync
        #[arg(long, value_name = "BOOL")]
        auto_sync: Option<bool>,
        /// Only sync when asked
        #[arg(long, value_name = "BOOL")]
        manual_only: Option<bool>,
        /// Comma-separated categories that participate in sync
        #[arg(long, value_name = "LIST", value_delimiter = ',')]
        categories: Option<Vec<String>>,
    },
}
