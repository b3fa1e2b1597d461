//! Command implementations for the CLI.

mod caps;
mod config;
mod history;
mod read;
mod scan;
mod set;

pub use caps::cmd_caps;
pub use config::cmd_config;
pub use history::{HistoryArgs, cmd_history};
pub use read::cmd_read;
pub use scan::cmd_scan;
pub use set::cmd_set;
