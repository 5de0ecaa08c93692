//! Safety event stream.
//!
//! The core publishes a [`SafetyEvent`] for every observable change, in the
//! order the changes were applied. Consumers that only need the current
//! picture should read the snapshot instead; events are for reacting to
//! transitions (ringing a bell, persisting nodes, showing a toast).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use smartguard_types::{
    ConnectionState, DataSource, DeviceNode, GatewayTelemetry, MeshAlert, Status, Theme,
    UserSettings,
};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// Events emitted by the safety core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SafetyEvent {
    /// Derived status changed.
    StatusChanged { from: Status, to: Status },
    /// Authoritative data source changed.
    SourceChanged { from: DataSource, to: DataSource },
    /// Connection type or status changed.
    ConnectionChanged { state: ConnectionState },
    /// New gateway telemetry was stored (cloud or demo).
    Telemetry { telemetry: GatewayTelemetry },
    /// A local emergency alert became active.
    AlertRaised { alert: MeshAlert },
    /// The active alert was cleared by the user.
    AlertCleared { alert: MeshAlert },
    /// A node was created or updated.
    NodeUpdated { node: DeviceNode, created: bool },
    /// A node was removed.
    NodeRemoved { node: DeviceNode },
    /// Settings were replaced.
    SettingsChanged { settings: UserSettings },
    /// The theme was toggled.
    ThemeChanged { theme: Theme },
    /// A proximity link was established.
    Linked { device: String },
    /// The proximity link closed.
    Unlinked { device: String, user_initiated: bool },
    /// An automatic re-link attempt started.
    ReconnectStarted { device: String, attempt: u32 },
    /// User-facing message (toast).
    Notice { level: NoticeLevel, message: String },
}

impl SafetyEvent {
    /// Success notice.
    pub fn success(message: impl Into<String>) -> Self {
        Self::Notice {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// Error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Informational notice.
    pub fn info(message: impl Into<String>) -> Self {
        Self::Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }
}

/// Sender for safety events.
pub type EventSender = broadcast::Sender<SafetyEvent>;

/// Receiver for safety events.
pub type EventReceiver = broadcast::Receiver<SafetyEvent>;

/// Fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a dispatcher buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SafetyEvent) {
        // no receivers is fine
        let _ = self.sender.send(event);
    }

    /// Number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
