//! The safety core service.
//!
//! [`SafetyCore`] runs a single actor task that owns a [`SafetyState`] and
//! serialises every input through one `select!` loop: user commands, cloud
//! poll reports, demo ticks, proximity frames and link lifecycle results.
//! Two inputs are therefore never applied concurrently, and no locks guard
//! the state.
//!
//! Consumers read the latest [`SafetySnapshot`] from a watch channel and
//! react to transitions through the [`SafetyEvent`] broadcast.
//!
//! ```no_run
//! use smartguard_core::{SafetyCore, UserSettings};
//!
//! # async fn example() -> smartguard_core::Result<()> {
//! let core = SafetyCore::builder()
//!     .settings(UserSettings::default())
//!     .spawn()?;
//!
//! let mut events = core.subscribe();
//! core.link_mesh().await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::future::pending;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use smartguard_types::{DeviceNode, MeshAlert, Theme, UserSettings};

use crate::cloud::{
    ChannelConfig, CloudPoller, DEFAULT_ENDPOINT, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
    PollReport, TelemetryClient, TelemetrySource,
};
use crate::demo::{DEFAULT_ALERT_PROBABILITY, DEFAULT_DEMO_INTERVAL, DemoGenerator};
use crate::error::{Error, Result, TransportFailure};
use crate::events::{EventDispatcher, EventReceiver, SafetyEvent};
use crate::mesh::{LinkEvent, MeshSession, MeshTransport, PairedDevice, decode_frame};
use crate::notifier::{AlertNotifier, LogNotifier};
use crate::reconcile::{PollApplied, SafetySnapshot, SafetyState};
use crate::reconnect::ReconnectOptions;
use crate::registry::{NewNode, NodePatch};
use crate::task::RepeatingTask;

const COMMAND_BUFFER: usize = 32;
const INPUT_BUFFER: usize = 16;

/// Timing and sizing options for the core.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Interval between cloud polls.
    pub cloud_interval: Duration,
    /// Timeout for a single cloud request.
    pub request_timeout: Duration,
    /// Interval between demo ticks.
    pub demo_interval: Duration,
    /// Per-tick probability of a synthetic demo alert.
    pub alert_probability: f64,
    /// Seed for the demo generator (random when `None`).
    pub demo_seed: Option<u64>,
    /// Upper bound on a pairing attempt.
    pub pair_timeout: Duration,
    /// Backoff for re-establishing a lost link.
    pub reconnect: ReconnectOptions,
    /// Events buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            cloud_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            demo_interval: DEFAULT_DEMO_INTERVAL,
            alert_probability: DEFAULT_ALERT_PROBABILITY,
            demo_seed: None,
            pair_timeout: Duration::from_secs(60),
            reconnect: ReconnectOptions::default(),
            event_capacity: 100,
        }
    }
}

impl CoreOptions {
    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.cloud_interval.is_zero() || self.demo_interval.is_zero() {
            return Err(Error::invalid_config("poll and demo intervals must be > 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::invalid_config("request_timeout must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.alert_probability) {
            return Err(Error::invalid_config(
                "alert_probability must be between 0 and 1",
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        self.reconnect.validate()
    }
}

enum Command {
    Link(oneshot::Sender<Result<PairedDevice>>),
    Unlink(oneshot::Sender<bool>),
    ClearAlert(oneshot::Sender<Option<MeshAlert>>),
    UpdateSettings(Box<UserSettings>, oneshot::Sender<Result<()>>),
    ToggleTheme(oneshot::Sender<Theme>),
    AddNode(NewNode, oneshot::Sender<Option<DeviceNode>>),
    UpdateNode(String, NodePatch, oneshot::Sender<Option<DeviceNode>>),
    RemoveNode(String, oneshot::Sender<Option<DeviceNode>>),
}

enum LinkInput {
    Paired {
        attempt: u64,
        result: Result<MeshSession>,
        reply: oneshot::Sender<Result<PairedDevice>>,
    },
    ReconnectAttempt {
        attempt: u64,
        number: u32,
    },
    Reconnected {
        attempt: u64,
        session: MeshSession,
    },
    ReconnectFailed {
        attempt: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Pairing,
    Reconnect,
}

struct Pending {
    attempt: u64,
    kind: PendingKind,
    cancel: CancellationToken,
}

/// Cloneable handle for issuing commands to a running core.
#[derive(Debug, Clone)]
pub struct SafetyHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SafetySnapshot>,
    events: EventDispatcher,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Link(_) => "Link",
            Command::Unlink(_) => "Unlink",
            Command::ClearAlert(_) => "ClearAlert",
            Command::UpdateSettings(..) => "UpdateSettings",
            Command::ToggleTheme(_) => "ToggleTheme",
            Command::AddNode(..) => "AddNode",
            Command::UpdateNode(..) => "UpdateNode",
            Command::RemoveNode(..) => "RemoveNode",
        };
        f.write_str(name)
    }
}

impl SafetyHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Discover and pair a gateway, resolving once the link is up or has failed.
    ///
    /// Resolves immediately with the current device if already linked.
    pub async fn link_mesh(&self) -> Result<PairedDevice> {
        self.request(Command::Link).await?
    }

    /// Close the proximity link or cancel a pairing/re-link in progress.
    ///
    /// Returns whether anything was closed.
    pub async fn unlink_mesh(&self) -> Result<bool> {
        self.request(Command::Unlink).await
    }

    /// Acknowledge and clear the active alert, returning it.
    pub async fn clear_alert(&self) -> Result<Option<MeshAlert>> {
        self.request(Command::ClearAlert).await
    }

    /// Replace the settings.
    ///
    /// Invalid settings are rejected with [`Error::InvalidConfig`].
    pub async fn update_settings(&self, settings: UserSettings) -> Result<()> {
        self.request(|tx| Command::UpdateSettings(Box::new(settings), tx))
            .await?
    }

    /// Flip between dark and light theme.
    pub async fn toggle_theme(&self) -> Result<Theme> {
        self.request(Command::ToggleTheme).await
    }

    /// Add a node by hand. `None` if its device id is already registered.
    pub async fn add_node(&self, node: NewNode) -> Result<Option<DeviceNode>> {
        self.request(|tx| Command::AddNode(node, tx)).await
    }

    /// Update a node by local id.
    pub async fn update_node(
        &self,
        id: impl Into<String>,
        patch: NodePatch,
    ) -> Result<Option<DeviceNode>> {
        let id = id.into();
        self.request(|tx| Command::UpdateNode(id, patch, tx)).await
    }

    /// Remove a node by local id.
    pub async fn remove_node(&self, id: impl Into<String>) -> Result<Option<DeviceNode>> {
        let id = id.into();
        self.request(|tx| Command::RemoveNode(id, tx)).await
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> SafetySnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch receiver for snapshots.
    pub fn watch(&self) -> watch::Receiver<SafetySnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Whether the core is still running.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Builder for [`SafetyCore`].
pub struct SafetyCoreBuilder {
    settings: UserSettings,
    nodes: Vec<DeviceNode>,
    options: CoreOptions,
    endpoint: String,
    source: Option<Arc<dyn TelemetrySource>>,
    transport: Option<Arc<dyn MeshTransport>>,
    notifier: Arc<dyn AlertNotifier>,
}

impl Default for SafetyCoreBuilder {
    fn default() -> Self {
        Self {
            settings: UserSettings::default(),
            nodes: Vec::new(),
            options: CoreOptions::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            source: None,
            transport: None,
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl SafetyCoreBuilder {
    /// Initial settings.
    pub fn settings(mut self, settings: UserSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Persisted nodes.
    pub fn nodes(mut self, nodes: Vec<DeviceNode>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Timing options.
    pub fn options(mut self, options: CoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Telemetry endpoint used when no source is supplied.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Cloud telemetry source.
    pub fn telemetry_source(mut self, source: Arc<dyn TelemetrySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Proximity transport.
    pub fn transport(mut self, transport: Arc<dyn MeshTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Alert notifier.
    pub fn notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Start the core on the current tokio runtime.
    pub fn spawn(self) -> Result<SafetyCore> {
        self.options.validate()?;

        let source = match self.source {
            Some(source) => source,
            None => Arc::new(TelemetryClient::with_timeout(
                &self.endpoint,
                self.options.request_timeout,
            )?),
        };

        let state = SafetyState::new(self.settings, self.nodes);
        let snapshot = state.snapshot();
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot.clone());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (poll_tx, poll_rx) = mpsc::channel(INPUT_BUFFER);
        let (link_tx, link_rx) = mpsc::channel(INPUT_BUFFER);
        let events = EventDispatcher::new(self.options.event_capacity);
        let shutdown = CancellationToken::new();

        let demo = match self.options.demo_seed {
            Some(seed) => DemoGenerator::seeded(seed, self.options.alert_probability),
            None => DemoGenerator::new(self.options.alert_probability),
        };

        let actor = Actor {
            poller: CloudPoller::new(
                source,
                self.options.cloud_interval,
                self.options.request_timeout,
            ),
            state,
            last: snapshot,
            snapshot_tx,
            events: events.clone(),
            commands: command_rx,
            poll_tx,
            poll_rx,
            cloud_task: None,
            demo,
            demo_timer: None,
            transport: self.transport,
            notifier: self.notifier,
            link: None,
            link_tx,
            link_rx,
            pending: None,
            next_attempt: 0,
            options: self.options,
            shutdown: shutdown.clone(),
        };

        let task = tokio::spawn(actor.run().instrument(info_span!("safety_core")));

        Ok(SafetyCore {
            handle: SafetyHandle {
                commands: command_tx,
                snapshot: snapshot_rx,
                events,
            },
            shutdown,
            task: Some(task),
        })
    }
}

/// Running safety core. Dropping it stops the actor and all its timers.
#[derive(Debug)]
pub struct SafetyCore {
    handle: SafetyHandle,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SafetyCore {
    /// Start building a core.
    pub fn builder() -> SafetyCoreBuilder {
        SafetyCoreBuilder::default()
    }

    /// A cloneable command handle.
    pub fn handle(&self) -> SafetyHandle {
        self.handle.clone()
    }

    /// Stop the actor and wait for teardown to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Deref for SafetyCore {
    type Target = SafetyHandle;

    fn deref(&self) -> &SafetyHandle {
        &self.handle
    }
}

impl Drop for SafetyCore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Actor {
    state: SafetyState,
    last: SafetySnapshot,
    snapshot_tx: watch::Sender<SafetySnapshot>,
    events: EventDispatcher,
    commands: mpsc::Receiver<Command>,
    options: CoreOptions,
    shutdown: CancellationToken,

    poller: CloudPoller,
    poll_tx: mpsc::Sender<PollReport>,
    poll_rx: mpsc::Receiver<PollReport>,
    cloud_task: Option<RepeatingTask>,

    demo: DemoGenerator,
    demo_timer: Option<Interval>,

    transport: Option<Arc<dyn MeshTransport>>,
    notifier: Arc<dyn AlertNotifier>,
    link: Option<MeshSession>,
    link_tx: mpsc::Sender<LinkInput>,
    link_rx: mpsc::Receiver<LinkInput>,
    pending: Option<Pending>,
    next_attempt: u64,
}

async fn next_link_event(link: &mut Option<MeshSession>) -> Option<LinkEvent> {
    match link {
        Some(session) => session.events.recv().await,
        None => pending().await,
    }
}

async fn next_demo_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}

impl Actor {
    async fn run(mut self) {
        info!("Safety core started");
        self.restart_sources();
        self.publish();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(report) = self.poll_rx.recv() => self.handle_poll(report),
                _ = next_demo_tick(&mut self.demo_timer) => self.handle_demo_tick(),
                event = next_link_event(&mut self.link) => self.handle_link_event(event),
                Some(input) = self.link_rx.recv() => self.handle_link_input(input),
            }
            self.publish();
        }

        self.teardown();
        info!("Safety core stopped");
    }

    fn emit(&self, event: SafetyEvent) {
        self.events.send(event);
    }

    fn publish(&mut self) {
        let next = self.state.snapshot();
        if next.status != self.last.status {
            info!(from = %self.last.status, to = %next.status, "Status changed");
            self.emit(SafetyEvent::StatusChanged {
                from: self.last.status,
                to: next.status,
            });
        }
        if next.data_source != self.last.data_source {
            self.emit(SafetyEvent::SourceChanged {
                from: self.last.data_source,
                to: next.data_source,
            });
        }
        if next.connection != self.last.connection {
            debug!(connection = %next.connection, "Connection changed");
            self.emit(SafetyEvent::ConnectionChanged {
                state: next.connection,
            });
        }
        if next != self.last {
            self.snapshot_tx.send_replace(next.clone());
            self.last = next;
        }
    }

    /// Replace the cloud poller and demo timer to match the current settings.
    fn restart_sources(&mut self) {
        self.cloud_task = None;
        self.demo_timer = None;

        if self.state.cloud_active() {
            let channel = ChannelConfig::from_settings(self.state.settings());
            info!(channel = %channel.channel_id, "Starting cloud polling");
            self.cloud_task = Some(self.poller.start(
                channel,
                self.state.generation(),
                self.poll_tx.clone(),
            ));
        }

        if self.state.demo_active() {
            info!("Starting demo generator");
            let mut timer = interval(self.options.demo_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.demo_timer = Some(timer);
        }
    }

    fn raise_alert(&self, alert: &MeshAlert) {
        self.emit(SafetyEvent::AlertRaised {
            alert: alert.clone(),
        });
        if self.state.settings().notifications_enabled {
            self.notifier.notify(alert);
        }
    }

    /// Publish, then answer.
    fn reply<T>(&mut self, tx: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = tx.send(value);
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "Command");
        match command {
            Command::Link(reply) => self.start_pairing(reply),
            Command::Unlink(reply) => {
                let unlinked = self.unlink();
                self.reply(reply, unlinked);
            }
            Command::ClearAlert(reply) => {
                let cleared = self.state.clear_alert();
                if let Some(alert) = &cleared {
                    self.emit(SafetyEvent::AlertCleared {
                        alert: alert.clone(),
                    });
                }
                self.reply(reply, cleared);
            }
            Command::UpdateSettings(settings, reply) => {
                let result = self.update_settings(*settings);
                self.reply(reply, result);
            }
            Command::ToggleTheme(reply) => {
                let theme = self.state.toggle_theme();
                self.emit(SafetyEvent::ThemeChanged { theme });
                self.reply(reply, theme);
            }
            Command::AddNode(node, reply) => {
                let added = self.state.add_node(node);
                match &added {
                    Some(node) => {
                        self.emit(SafetyEvent::NodeUpdated {
                            node: node.clone(),
                            created: true,
                        });
                        self.emit(SafetyEvent::success(format!(
                            "Device \"{}\" added.",
                            node.name
                        )));
                    }
                    None => self.emit(SafetyEvent::error("Device is already registered.")),
                }
                self.reply(reply, added);
            }
            Command::UpdateNode(id, patch, reply) => {
                let updated = self.state.update_node(&id, patch);
                if let Some(node) = &updated {
                    self.emit(SafetyEvent::NodeUpdated {
                        node: node.clone(),
                        created: false,
                    });
                }
                self.reply(reply, updated);
            }
            Command::RemoveNode(id, reply) => {
                let removed = self.state.remove_node(&id);
                if let Some(node) = &removed {
                    self.emit(SafetyEvent::NodeRemoved { node: node.clone() });
                    self.emit(SafetyEvent::info("Device removed from network."));
                }
                self.reply(reply, removed);
            }
        }
    }

    fn update_settings(&mut self, settings: UserSettings) -> Result<()> {
        let errors = settings.validate();
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::InvalidConfig(message));
        }

        let stop_reconnect = !settings.auto_connect;
        let source_changed = self.state.apply_settings(settings);
        self.emit(SafetyEvent::SettingsChanged {
            settings: self.state.settings().clone(),
        });

        if stop_reconnect
            && self
                .pending
                .as_ref()
                .is_some_and(|p| p.kind == PendingKind::Reconnect)
        {
            self.cancel_pending();
            self.state.mesh_disconnected();
        }

        if source_changed {
            self.restart_sources();
        }
        Ok(())
    }

    fn handle_poll(&mut self, report: PollReport) {
        match self.state.apply_poll(report) {
            PollApplied::Ignored => {}
            PollApplied::Stored(telemetry) => {
                debug!(ppm = telemetry.ppm, "Cloud sample stored");
                self.emit(SafetyEvent::Telemetry { telemetry });
            }
            PollApplied::StatusOnly {
                entered_error: Some(message),
            } => {
                self.emit(SafetyEvent::error(format!("Cloud sync failed: {message}")));
            }
            PollApplied::StatusOnly { entered_error: None } => {}
        }
    }

    fn handle_demo_tick(&mut self) {
        let tick = self
            .demo
            .tick(self.state.alert().is_some(), OffsetDateTime::now_utc());
        let raised = self.state.apply_demo(tick);
        self.emit(SafetyEvent::Telemetry {
            telemetry: *self.state.telemetry(),
        });
        if let Some(alert) = raised {
            self.raise_alert(&alert);
        }
    }

    fn handle_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Frame(frame)) => {
                let Some(packet) = decode_frame(&frame) else {
                    return;
                };
                let Some(applied) = self.state.apply_packet(packet, OffsetDateTime::now_utc())
                else {
                    return;
                };
                if let Some(alert) = &applied.alert {
                    self.raise_alert(alert);
                }
                self.emit(SafetyEvent::NodeUpdated {
                    node: applied.node.node,
                    created: applied.node.created,
                });
            }
            Some(LinkEvent::Lost(reason)) => self.link_lost(&reason),
            None => self.link_lost("transport closed"),
        }
    }

    fn link_lost(&mut self, reason: &str) {
        let Some(session) = self.link.take() else {
            return;
        };
        session.close();
        warn!(device = %session.device.id, "Link lost: {reason}");
        self.state.mesh_disconnected();
        self.emit(SafetyEvent::Unlinked {
            device: session.device.label().to_string(),
            user_initiated: false,
        });
        self.emit(SafetyEvent::error(
            TransportFailure::LinkLost.to_string(),
        ));

        if self.state.settings().auto_connect {
            self.start_reconnect(session.device);
        }
    }

    fn next_attempt(&mut self) -> u64 {
        self.next_attempt += 1;
        self.next_attempt
    }

    fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn start_pairing(&mut self, reply: oneshot::Sender<Result<PairedDevice>>) {
        let Some(transport) = self.transport.clone() else {
            let _ = reply.send(Err(TransportFailure::Unsupported.into()));
            return;
        };
        if let Some(session) = &self.link {
            let _ = reply.send(Ok(session.device.clone()));
            return;
        }
        if let Some(pending) = &self.pending {
            if pending.kind == PendingKind::Pairing {
                let _ = reply.send(Err(Error::Busy("Pairing")));
                return;
            }
            // an explicit link request replaces automatic re-linking
            self.cancel_pending();
        }

        let attempt = self.next_attempt();
        let cancel = CancellationToken::new();
        self.pending = Some(Pending {
            attempt,
            kind: PendingKind::Pairing,
            cancel: cancel.clone(),
        });
        self.state.mesh_connecting();
        info!(attempt, "Pairing started");

        let tx = self.link_tx.clone();
        let timeout = self.options.pair_timeout;
        tokio::spawn(
            async move {
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    result = tokio::time::timeout(timeout, transport.pair()) => {
                        result.unwrap_or_else(|_| Err(Error::timeout("pairing", timeout)))
                    }
                };
                let _ = tx
                    .send(LinkInput::Paired {
                        attempt,
                        result,
                        reply,
                    })
                    .await;
            }
            .instrument(info_span!("pair", attempt)),
        );
    }

    fn start_reconnect(&mut self, device: PairedDevice) {
        let Some(transport) = self.transport.clone() else {
            return;
        };
        self.cancel_pending();

        let attempt = self.next_attempt();
        let cancel = CancellationToken::new();
        self.pending = Some(Pending {
            attempt,
            kind: PendingKind::Reconnect,
            cancel: cancel.clone(),
        });
        self.state.mesh_connecting();

        let tx = self.link_tx.clone();
        let options = self.options.reconnect.clone();
        let device_id = device.id.clone();
        tokio::spawn(
            async move {
                let mut made = 0u32;
                while options.allows_attempt(made) {
                    let delay = options.delay_for_attempt(made);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    made += 1;
                    let _ = tx
                        .send(LinkInput::ReconnectAttempt {
                            attempt,
                            number: made,
                        })
                        .await;

                    let result = tokio::select! {
                        _ = cancel.cancelled() => return,
                        result = transport.reconnect(&device) => result,
                    };
                    match result {
                        Ok(session) => {
                            let _ = tx.send(LinkInput::Reconnected { attempt, session }).await;
                            return;
                        }
                        Err(e) => warn!(attempt = made, "Re-link failed: {e}"),
                    }
                }
                let _ = tx.send(LinkInput::ReconnectFailed { attempt }).await;
            }
            .instrument(info_span!("reconnect", device = %device_id)),
        );
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.pending.as_ref().is_some_and(|p| p.attempt == attempt)
    }

    fn handle_link_input(&mut self, input: LinkInput) {
        match input {
            LinkInput::Paired {
                attempt,
                result,
                reply,
            } => {
                if !self.is_current(attempt) {
                    if let Ok(session) = result {
                        session.close();
                    }
                    let _ = reply.send(Err(Error::Cancelled));
                    return;
                }
                self.pending = None;
                match result {
                    Ok(session) => {
                        let device = session.device.clone();
                        self.linked(session);
                        self.emit(SafetyEvent::success(format!(
                            "Linked to {}.",
                            device.label()
                        )));
                        self.reply(reply, Ok(device));
                    }
                    Err(e) => {
                        warn!("Pairing failed: {e}");
                        self.state.mesh_disconnected();
                        self.emit(SafetyEvent::error(e.user_message()));
                        self.reply(reply, Err(e));
                    }
                }
            }
            LinkInput::ReconnectAttempt { attempt, number } => {
                if !self.is_current(attempt) {
                    return;
                }
                if let Some(device) = self.state.paired_device() {
                    self.emit(SafetyEvent::ReconnectStarted {
                        device: device.label().to_string(),
                        attempt: number,
                    });
                }
            }
            LinkInput::Reconnected { attempt, session } => {
                if !self.is_current(attempt) {
                    session.close();
                    return;
                }
                self.pending = None;
                let label = session.device.label().to_string();
                self.linked(session);
                self.emit(SafetyEvent::success(format!("Re-linked to {label}.")));
            }
            LinkInput::ReconnectFailed { attempt } => {
                if !self.is_current(attempt) {
                    return;
                }
                self.pending = None;
                error!("Giving up re-linking to gateway");
                self.state.mesh_disconnected();
                self.emit(SafetyEvent::error(
                    "Could not re-link to gateway. Link it again to resume.",
                ));
            }
        }
    }

    fn linked(&mut self, session: MeshSession) {
        info!(device = %session.device.id, "Gateway linked");
        self.state.mesh_linked(session.device.clone());
        self.emit(SafetyEvent::Linked {
            device: session.device.label().to_string(),
        });
        self.link = Some(session);
    }

    fn unlink(&mut self) -> bool {
        let cancelled = self.cancel_pending();
        let session = self.link.take();
        if let Some(session) = &session {
            session.close();
            info!(device = %session.device.id, "Gateway unlinked");
            self.emit(SafetyEvent::Unlinked {
                device: session.device.label().to_string(),
                user_initiated: true,
            });
        }

        if !cancelled && session.is_none() {
            return false;
        }
        self.state.mesh_disconnected();
        self.state.forget_paired();
        self.emit(SafetyEvent::info("Gateway unlinked."));
        true
    }

    fn teardown(&mut self) {
        self.cloud_task = None;
        self.demo_timer = None;
        self.cancel_pending();
        if let Some(session) = self.link.take() {
            session.close();
        }
        self.state.mesh_disconnected();
        self.publish();
    }
}
