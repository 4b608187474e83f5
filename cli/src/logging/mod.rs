//! Logging infrastructure for structured console and file output.

mod filter;
mod logger;
mod subscriber;
mod types;

pub use filter::{LineLevel, ScriptOutputFilter, classify, clean_line, is_important};
pub use logger::{Logger, ToolLogger};
pub use subscriber::{ConsoleOptions, LOG_ENV, init_subscriber};
pub use types::{EntryStatus, Log, SummaryEntry};

#[cfg(test)]
pub use types::test_helpers;
