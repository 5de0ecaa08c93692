use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod format;
mod style;
mod util;

use cli::{Cli, Commands};
use commands::{HistoryArgs, MonitorArgs};

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "smartguard", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    let store = util::open_store(cli.db.as_deref())?;
    let no_color = cli.no_color;

    match cli.command {
        Commands::Monitor { link, format } => {
            commands::cmd_monitor(
                &store,
                MonitorArgs {
                    link,
                    format,
                    endpoint: &cli.endpoint,
                    quiet: cli.quiet,
                    no_color,
                },
            )
            .await?;
        }
        Commands::History {
            range,
            format,
            output,
        } => {
            commands::cmd_history(
                &store,
                HistoryArgs {
                    range,
                    format,
                    output: output.as_ref(),
                    endpoint: &cli.endpoint,
                    quiet: cli.quiet,
                    no_color,
                },
            )
            .await?;
        }
        Commands::Report { output } => {
            commands::cmd_report(&store, &cli.endpoint, output.as_ref()).await?;
        }
        Commands::Nodes { action } => commands::cmd_nodes(&store, action, no_color)?,
        Commands::Settings { action } => commands::cmd_settings(&store, action, no_color)?,
        Commands::Theme => commands::cmd_theme(&store, no_color)?,
        Commands::Login => commands::cmd_login(&store, no_color)?,
        Commands::Logout => commands::cmd_logout(&store, no_color)?,
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }

    Ok(())
}
