pub mod common;
pub mod completions;
pub mod get;
pub mod outbox;
pub mod prefs;
pub mod record;
pub mod resolve;
pub mod set;
pub mod sync;
pub mod watch;
