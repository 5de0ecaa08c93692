//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use smartguard_core::HistoryRange;
use smartguard_core::cloud::DEFAULT_ENDPOINT;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Output format for streaming commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StreamFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "smartguard")]
#[command(
    author,
    version,
    about = "Gas-safety dashboard for SmartGuard gateways",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Path to the state database
    #[arg(long, global = true, env = "SMARTGUARD_DB")]
    pub db: Option<PathBuf>,

    /// Telemetry service base URL
    #[arg(
        long,
        global = true,
        env = "SMARTGUARD_TELEMETRY_URL",
        default_value = DEFAULT_ENDPOINT
    )]
    pub endpoint: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Live dashboard (keys: s silence, r report, l link, u unlink, d demo, t theme, q quit)
    Monitor {
        /// Pair with a gateway over Bluetooth on start
        #[arg(long)]
        link: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: StreamFormat,
    },

    /// Show or export telemetry history
    History {
        /// Time range (1H, 24H, 7D)
        #[arg(short, long, default_value = "24H")]
        range: HistoryRange,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Write to this file (or into this directory with a generated name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print an incident report for the current state
    Report {
        /// Write the report to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage sensor nodes
    Nodes {
        #[command(subcommand)]
        action: NodesAction,
    },

    /// Manage settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Toggle between dark and light theme
    Theme,

    /// Log in
    Login,

    /// Log out
    Logout,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum NodesAction {
    /// List known nodes
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Register a node by hand
    Add {
        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Installation location
        #[arg(short, long)]
        location: Option<String>,

        /// Id the node reports over the mesh
        #[arg(short, long)]
        device_id: Option<String>,
    },

    /// Update a node
    Update {
        /// Local node id
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        /// Battery level (0-100)
        #[arg(short, long)]
        battery: Option<u8>,

        /// Signal strength in dBm
        #[arg(short, long, allow_hyphen_values = true)]
        signal: Option<i16>,
    },

    /// Remove a node
    Remove {
        /// Local node id
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show current settings
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Change one setting
    Set {
        /// Setting name (warning, danger, notifications, auto-purge,
        /// auto-connect, demo, contact, theme, channel, read-key,
        /// endpoint-url, endpoint-key)
        key: String,

        /// New value
        value: String,
    },

    /// Restore defaults
    Reset,
}
