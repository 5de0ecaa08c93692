//! Command implementations for the CLI.

mod auth;
mod history;
mod monitor;
mod nodes;
mod report;
mod settings;

pub use auth::{cmd_login, cmd_logout, cmd_theme};
pub use history::{HistoryArgs, cmd_history};
pub use monitor::{MonitorArgs, cmd_monitor};
pub use nodes::cmd_nodes;
pub use report::cmd_report;
pub use settings::cmd_settings;
