//! History command implementation.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use smartguard_core::cloud::DEFAULT_REQUEST_TIMEOUT;
use smartguard_core::export::{export_file_name, to_csv_string, write_csv};
use smartguard_core::{History, HistoryRange, TelemetryClient, history};
use smartguard_store::Store;
use time::OffsetDateTime;

use crate::cli::OutputFormat;
use crate::format::{as_json, format_history_text};
use crate::style;
use crate::util::write_output;

/// Arguments for the history command.
pub struct HistoryArgs<'a> {
    pub range: HistoryRange,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub endpoint: &'a str,
    pub quiet: bool,
    pub no_color: bool,
}

pub async fn cmd_history(store: &Store, args: HistoryArgs<'_>) -> Result<()> {
    let HistoryArgs {
        range,
        format,
        output,
        endpoint,
        quiet,
        no_color,
    } = args;

    let settings = store.load_settings()?;
    let source = TelemetryClient::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)?;
    let now = OffsetDateTime::now_utc();
    let history = history::load(&settings, &source, range, DEFAULT_REQUEST_TIMEOUT, now)
        .await
        .context("Failed to load history")?;

    match format {
        OutputFormat::Text => write_output(
            output,
            &format_history_text(&history, &settings, no_color),
        ),
        OutputFormat::Json => write_output(output, &as_json(&history)?),
        OutputFormat::Csv => {
            if history.is_empty() {
                if !quiet {
                    eprintln!(
                        "{}",
                        style::format_info("No history to export.", no_color)
                    );
                }
                return Ok(());
            }
            match output {
                Some(path) => {
                    let path = export_path(path, &history, now);
                    let written = export_csv(&path, &history)?;
                    if !quiet {
                        eprintln!(
                            "{}",
                            style::format_success(
                                &format!("Exported {written} rows to {}.", path.display()),
                                no_color
                            )
                        );
                    }
                    Ok(())
                }
                None => write_output(None, &to_csv_string(&history.samples)?),
            }
        }
    }
}

/// Resolve `--output`: a directory gets a generated file name.
fn export_path(output: &Path, history: &History, now: OffsetDateTime) -> PathBuf {
    if output.is_dir() {
        output.join(export_file_name(history.origin, history.range, now))
    } else {
        output.to_path_buf()
    }
}

fn export_csv(path: &Path, history: &History) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let written = write_csv(BufWriter::new(file), &history.samples)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(written)
}
