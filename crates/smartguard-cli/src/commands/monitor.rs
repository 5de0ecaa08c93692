//! Monitor command implementation.
//!
//! Runs the safety core until Ctrl+C or `q`, rendering events as they
//! arrive and reading single-letter commands from stdin. Settings and node
//! changes are written back to the store as they happen.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use smartguard_core::{
    AlertNotifier, BleMeshTransport, IncidentReport, MeshAlert, SafetyCore, SafetyEvent,
    SafetyHandle,
};
use smartguard_store::Store;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::cli::StreamFormat;
use crate::format::{as_json_line, format_event_text, format_snapshot_line, format_snapshot_text};
use crate::style;
use crate::util::require_login;

/// Gap between the two bell rings of an alert.
const BELL_GAP: Duration = Duration::from_millis(700);

/// Rings the terminal bell twice per alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct BellNotifier;

fn ring() {
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(b"\x07");
    let _ = stderr.flush();
}

impl AlertNotifier for BellNotifier {
    fn notify(&self, alert: &MeshAlert) {
        debug!(device = %alert.source_device_id, "Ringing bell");
        ring();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async {
                tokio::time::sleep(BELL_GAP).await;
                ring();
            });
        }
    }
}

/// Arguments for the monitor command.
pub struct MonitorArgs<'a> {
    pub link: bool,
    pub format: StreamFormat,
    pub endpoint: &'a str,
    pub quiet: bool,
    pub no_color: bool,
}

/// What a key press asks the loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Silence,
    Report,
    Link,
    Unlink,
    Demo,
    Theme,
    Quit,
    Help,
}

impl Key {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "s" => Some(Key::Silence),
            "r" => Some(Key::Report),
            "l" => Some(Key::Link),
            "u" => Some(Key::Unlink),
            "d" => Some(Key::Demo),
            "t" => Some(Key::Theme),
            "q" => Some(Key::Quit),
            "h" | "?" => Some(Key::Help),
            _ => None,
        }
    }
}

const HELP: &str =
    "Keys: s silence alert, r report, l link gateway, u unlink, d toggle demo, t theme, q quit";

pub async fn cmd_monitor(store: &Store, args: MonitorArgs<'_>) -> Result<()> {
    let MonitorArgs {
        link,
        format,
        endpoint,
        quiet,
        no_color,
    } = args;
    require_login(store)?;

    let core = SafetyCore::builder()
        .settings(store.load_settings()?)
        .nodes(store.load_nodes()?)
        .endpoint(endpoint)
        .transport(Arc::new(BleMeshTransport::new()))
        .notifier(Arc::new(BellNotifier))
        .spawn()?;
    let mut events = core.subscribe();

    match format {
        StreamFormat::Text => {
            print!("{}", format_snapshot_text(&core.snapshot(), no_color));
            if !quiet {
                eprintln!("{HELP}");
            }
        }
        StreamFormat::Json => print!("{}", as_json_line(&core.snapshot())?),
    }

    if link {
        spawn_link(core.handle());
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    persist(store, &core, &event);
                    render(&core, &event, format, no_color)?;
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let Some(key) = Key::parse(&line) else {
                        if !line.trim().is_empty() {
                            eprintln!("{}", style::format_info(HELP, no_color));
                        }
                        continue;
                    };
                    if key == Key::Quit {
                        break;
                    }
                    handle_key(&core, key, no_color).await;
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    debug!("stdin closed: {e}");
                    stdin_open = false;
                }
            },
        }
    }

    let snapshot = core.snapshot();
    store.save_settings(&snapshot.settings)?;
    store.save_nodes(&snapshot.nodes)?;
    core.shutdown().await;
    Ok(())
}

fn spawn_link(handle: SafetyHandle) {
    tokio::spawn(async move {
        // failures surface as notices on the event stream
        if let Err(e) = handle.link_mesh().await {
            debug!("Link request ended: {e}");
        }
    });
}

async fn handle_key(core: &SafetyCore, key: Key, no_color: bool) {
    let result = match key {
        Key::Silence => core.clear_alert().await.map(|cleared| {
            if cleared.is_none() {
                eprintln!("{}", style::format_info("No active alert.", no_color));
            }
        }),
        Key::Report => {
            let report = IncidentReport::compose(&core.snapshot(), OffsetDateTime::now_utc());
            println!("{report}");
            Ok(())
        }
        Key::Link => {
            spawn_link(core.handle());
            Ok(())
        }
        Key::Unlink => core.unlink_mesh().await.map(|_| ()),
        Key::Demo => {
            let mut settings = core.snapshot().settings;
            settings.demo_mode = !settings.demo_mode;
            core.update_settings(settings).await
        }
        Key::Theme => core.toggle_theme().await.map(|_| ()),
        Key::Help => {
            eprintln!("{HELP}");
            Ok(())
        }
        Key::Quit => Ok(()),
    };
    if let Err(e) = result {
        eprintln!("{}", style::format_error(&e.user_message(), no_color));
    }
}

/// Write settings and node changes through to the store.
fn persist(store: &Store, core: &SafetyCore, event: &SafetyEvent) {
    let result = match event {
        SafetyEvent::SettingsChanged { settings } => store.save_settings(settings),
        SafetyEvent::ThemeChanged { .. } => store.save_settings(&core.snapshot().settings),
        SafetyEvent::NodeUpdated { .. } | SafetyEvent::NodeRemoved { .. } => {
            store.save_nodes(&core.snapshot().nodes)
        }
        _ => return,
    };
    if let Err(e) = result {
        warn!("Failed to persist state: {e}");
    }
}

fn render(
    core: &SafetyCore,
    event: &SafetyEvent,
    format: StreamFormat,
    no_color: bool,
) -> Result<()> {
    match format {
        StreamFormat::Json => print!("{}", as_json_line(event)?),
        StreamFormat::Text => {
            if let Some(text) = format_event_text(event, no_color) {
                println!("{text}");
            }
            if matches!(
                event,
                SafetyEvent::Telemetry { .. }
                    | SafetyEvent::StatusChanged { .. }
                    | SafetyEvent::SourceChanged { .. }
                    | SafetyEvent::ConnectionChanged { .. }
            ) {
                println!("{}", format_snapshot_line(&core.snapshot(), no_color));
            }
        }
    }
    std::io::stdout().flush()?;
    Ok(())
}
