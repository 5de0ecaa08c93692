//! Source reconciliation state machine.
//!
//! [`SafetyState`] owns the gateway telemetry, the active alert, connector
//! statuses, settings and the node registry, and decides which source is
//! authoritative for display:
//!
//! | Condition | Data source | Displayed ppm | Status |
//! |-----------|-------------|---------------|--------|
//! | alert active | `local-mesh` | alert ppm | `Danger` |
//! | demo mode | `demo` | last demo sample | classified |
//! | otherwise | `cloud` | last cloud sample | classified |
//!
//! Nothing here does I/O or spawns tasks; [`crate::service::SafetyCore`]
//! feeds inputs in arrival order and publishes snapshots.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use smartguard_types::{
    ConnectionState, ConnectionStatus, ConnectionType, DataSource, DeviceNode, GatewayTelemetry,
    MeshAlert, MeshPacket, NodeRole, Status, Theme, UserSettings,
};

use crate::cloud::{PollOutcome, PollReport};
use crate::demo::DemoTick;
use crate::mesh::PairedDevice;
use crate::registry::{NewNode, NodePatch, NodeRegistry, Observation, Upserted};
use crate::thresholds::Thresholds;

/// Local id of the synthesized gateway node.
pub const GATEWAY_NODE_ID: &str = "gateway";

const GATEWAY_NAME: &str = "Main Gateway";
const GATEWAY_LOCATION: &str = "Primary";
const GATEWAY_BATTERY: u8 = 100;
const GATEWAY_SIGNAL_DBM: i16 = -45;

/// Reading shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayReading {
    /// Authoritative gas concentration.
    pub ppm: f64,
    /// Temperature, absent while an alert is shown.
    pub temperature: Option<f64>,
    /// Humidity, absent while an alert is shown.
    pub humidity: Option<f64>,
    /// When the shown value was captured (`None` means no data yet).
    #[serde(with = "time::serde::rfc3339::option")]
    pub captured_at: Option<OffsetDateTime>,
}

/// Consistent view of the core at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySnapshot {
    /// Overall safety status.
    pub status: Status,
    /// Source the displayed reading comes from.
    pub data_source: DataSource,
    /// Combined connection indicator.
    pub connection: ConnectionState,
    /// Status of the cloud or demo connector.
    pub source_status: ConnectionStatus,
    /// Status of the proximity link.
    pub mesh_status: ConnectionStatus,
    /// Reading shown on the dashboard.
    pub display: DisplayReading,
    /// Last stored gateway telemetry (kept while an alert hides it).
    pub telemetry: GatewayTelemetry,
    /// Active alert, until cleared.
    pub alert: Option<MeshAlert>,
    /// Registered nodes, gateway excluded.
    pub nodes: Vec<DeviceNode>,
    /// Whether any registered node reports danger.
    pub any_node_in_danger: bool,
    /// Gateway remembered for the proximity link.
    pub paired_device: Option<PairedDevice>,
    /// Settings in effect.
    pub settings: UserSettings,
}

impl SafetySnapshot {
    /// Read-only node describing the primary gateway.
    ///
    /// It is synthesized from the displayed reading and never stored in the
    /// registry.
    pub fn gateway_node(&self) -> DeviceNode {
        DeviceNode {
            id: GATEWAY_NODE_ID.to_string(),
            device_id: self.paired_device.as_ref().map(|d| d.id.clone()),
            name: self
                .paired_device
                .as_ref()
                .and_then(|d| d.name.clone())
                .unwrap_or_else(|| GATEWAY_NAME.to_string()),
            location: GATEWAY_LOCATION.to_string(),
            role: NodeRole::Gateway,
            ppm: self.display.ppm,
            temperature: self.display.temperature.unwrap_or(0.0),
            humidity: self.display.humidity.unwrap_or(0.0),
            battery: GATEWAY_BATTERY,
            signal: GATEWAY_SIGNAL_DBM,
            status: self.status,
            last_seen: self.display.captured_at,
        }
    }

    /// Whether any telemetry or alert has been received.
    pub fn has_data(&self) -> bool {
        self.display.captured_at.is_some()
    }
}

/// Effect of applying a poll report.
#[derive(Debug, Clone, PartialEq)]
pub enum PollApplied {
    /// Report was stale or the cloud is not the configured source.
    Ignored,
    /// A new sample was stored.
    Stored(GatewayTelemetry),
    /// Connector status updated; `entered_error` holds the failure text on
    /// the first failure after a non-error status.
    StatusOnly { entered_error: Option<String> },
}

/// Effect of applying a proximity packet.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketApplied {
    /// Alert raised by the packet.
    pub alert: Option<MeshAlert>,
    /// Registry change.
    pub node: Upserted,
}

/// The reconciliation state machine.
#[derive(Debug, Clone)]
pub struct SafetyState {
    settings: UserSettings,
    telemetry: GatewayTelemetry,
    source_status: ConnectionStatus,
    mesh_status: ConnectionStatus,
    paired: Option<PairedDevice>,
    alert: Option<MeshAlert>,
    registry: NodeRegistry,
    generation: u64,
}

impl SafetyState {
    /// Initial state for `settings` and persisted `nodes`.
    pub fn new(settings: UserSettings, nodes: Vec<DeviceNode>) -> Self {
        let source_status = initial_source_status(&settings);
        Self {
            settings,
            telemetry: GatewayTelemetry::neutral(),
            source_status,
            mesh_status: ConnectionStatus::Disconnected,
            paired: None,
            alert: None,
            registry: NodeRegistry::from_nodes(nodes),
            generation: 0,
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    /// Last stored gateway telemetry.
    pub fn telemetry(&self) -> &GatewayTelemetry {
        &self.telemetry
    }

    /// Active alert.
    pub fn alert(&self) -> Option<&MeshAlert> {
        self.alert.as_ref()
    }

    /// Known remote nodes.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Status of the proximity link.
    pub fn mesh_status(&self) -> ConnectionStatus {
        self.mesh_status
    }

    /// Status of the cloud or demo connector.
    pub fn source_status(&self) -> ConnectionStatus {
        self.source_status
    }

    /// Gateway remembered for re-linking.
    pub fn paired_device(&self) -> Option<&PairedDevice> {
        self.paired.as_ref()
    }

    /// Generation of the current cloud/demo source. Bumped on every source switch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the cloud poller should be running.
    pub fn cloud_active(&self) -> bool {
        !self.settings.demo_mode && self.settings.has_cloud_channel()
    }

    /// Whether the demo generator should be running.
    pub fn demo_active(&self) -> bool {
        self.settings.demo_mode
    }

    /// Authoritative data source.
    pub fn data_source(&self) -> DataSource {
        if self.alert.is_some() {
            DataSource::LocalMesh
        } else if self.settings.demo_mode {
            DataSource::Demo
        } else {
            DataSource::Cloud
        }
    }

    /// Derived status.
    pub fn status(&self) -> Status {
        match &self.alert {
            Some(_) => Status::Danger,
            None => Thresholds::from_settings(&self.settings).evaluate(self.telemetry.ppm),
        }
    }

    /// Reading to display.
    pub fn display(&self) -> DisplayReading {
        match &self.alert {
            Some(alert) => DisplayReading {
                ppm: alert.ppm,
                temperature: None,
                humidity: None,
                captured_at: Some(alert.observed_at),
            },
            None => DisplayReading {
                ppm: self.telemetry.ppm,
                temperature: Some(self.telemetry.temperature),
                humidity: Some(self.telemetry.humidity),
                captured_at: self.telemetry.captured_at,
            },
        }
    }

    /// Connection type and status for display.
    pub fn connection(&self) -> ConnectionState {
        match self.mesh_status {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                ConnectionState::new(ConnectionType::BluetoothProximity, self.mesh_status)
            }
            _ if self.settings.demo_mode => {
                ConnectionState::new(ConnectionType::Demo, ConnectionStatus::Connected)
            }
            _ if !self.settings.has_cloud_channel() => ConnectionState::offline(),
            _ => ConnectionState::new(ConnectionType::Network, self.source_status),
        }
    }

    /// Capture the full state.
    pub fn snapshot(&self) -> SafetySnapshot {
        SafetySnapshot {
            status: self.status(),
            data_source: self.data_source(),
            connection: self.connection(),
            source_status: self.source_status,
            mesh_status: self.mesh_status,
            display: self.display(),
            telemetry: self.telemetry,
            alert: self.alert.clone(),
            nodes: self.registry.list().to_vec(),
            any_node_in_danger: self.registry.any_in_danger(),
            paired_device: self.paired.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Swap in new settings.
    ///
    /// A demo toggle or channel change purges telemetry to neutral, starts a
    /// new source generation and returns `true`.
    pub fn apply_settings(&mut self, settings: UserSettings) -> bool {
        let source_changed = self.settings.source_changed(&settings);
        self.settings = settings;

        if source_changed {
            self.generation += 1;
            self.telemetry = GatewayTelemetry::neutral();
            self.source_status = initial_source_status(&self.settings);
            info!(
                generation = self.generation,
                demo = self.settings.demo_mode,
                "Data source switched"
            );
        }
        source_changed
    }

    /// Flip the theme.
    pub fn toggle_theme(&mut self) -> Theme {
        self.settings.theme = self.settings.theme.toggled();
        self.settings.theme
    }

    /// Apply a cloud poll report.
    pub fn apply_poll(&mut self, report: PollReport) -> PollApplied {
        if report.generation != self.generation || self.settings.demo_mode {
            debug!(
                report = report.generation,
                current = self.generation,
                "Discarding stale poll"
            );
            return PollApplied::Ignored;
        }

        let previous = self.source_status;
        self.source_status = report.outcome.status();

        match report.outcome {
            PollOutcome::Sample(sample) => {
                self.telemetry = GatewayTelemetry::from(sample);
                PollApplied::Stored(self.telemetry)
            }
            PollOutcome::Failed(message) => PollApplied::StatusOnly {
                entered_error: (previous != ConnectionStatus::Error).then_some(message),
            },
            PollOutcome::NoData | PollOutcome::Unconfigured => {
                PollApplied::StatusOnly { entered_error: None }
            }
        }
    }

    /// Apply a demo tick. Returns the alert it raised, if any.
    ///
    /// Ticks arriving after demo mode was switched off are ignored.
    pub fn apply_demo(&mut self, tick: DemoTick) -> Option<MeshAlert> {
        if !self.settings.demo_mode {
            return None;
        }
        self.telemetry = GatewayTelemetry::from(tick.sample);
        self.source_status = ConnectionStatus::Connected;

        let alert = tick.alert.filter(|_| self.alert.is_none())?;
        info!(device = %alert.source_device_id, ppm = alert.ppm, "Synthetic alert raised");
        self.alert = Some(alert.clone());
        Some(alert)
    }

    /// Apply a decoded proximity packet.
    ///
    /// Packets are only processed while the link is up.
    pub fn apply_packet(
        &mut self,
        packet: MeshPacket,
        now: OffsetDateTime,
    ) -> Option<PacketApplied> {
        if self.mesh_status != ConnectionStatus::Connected {
            warn!(device = packet.device_id(), "Dropping packet received while unlinked");
            return None;
        }

        match packet {
            MeshPacket::Alert {
                device_id,
                ppm,
                location,
            } => {
                let alert = MeshAlert {
                    source_device_id: device_id.clone(),
                    location: location.clone(),
                    ppm,
                    observed_at: now,
                };
                info!(device = %device_id, ppm, location = %location, "Mesh alert received");
                self.alert = Some(alert.clone());
                let node = self.registry.upsert(
                    &device_id,
                    Observation {
                        ppm,
                        temperature: None,
                        humidity: None,
                        location: Some(location),
                        status: Status::Danger,
                        seen_at: now,
                    },
                );
                Some(PacketApplied {
                    alert: Some(alert),
                    node,
                })
            }
            MeshPacket::Data {
                device_id,
                ppm,
                temperature,
                humidity,
            } => {
                let node = self.registry.upsert(
                    &device_id,
                    Observation {
                        ppm,
                        temperature: Some(temperature),
                        humidity: Some(humidity),
                        location: None,
                        status: Status::Safe,
                        seen_at: now,
                    },
                );
                Some(PacketApplied { alert: None, node })
            }
        }
    }

    /// Clear the active alert, returning it.
    pub fn clear_alert(&mut self) -> Option<MeshAlert> {
        let cleared = self.alert.take();
        if let Some(alert) = &cleared {
            info!(device = %alert.source_device_id, "Alert cleared");
        }
        cleared
    }

    /// Mark the proximity link as connecting.
    pub fn mesh_connecting(&mut self) {
        self.mesh_status = ConnectionStatus::Connecting;
    }

    /// Record an established link.
    pub fn mesh_linked(&mut self, device: PairedDevice) {
        self.mesh_status = ConnectionStatus::Connected;
        self.paired = Some(device);
    }

    /// Record that the link is down. The paired device is remembered.
    pub fn mesh_disconnected(&mut self) {
        self.mesh_status = ConnectionStatus::Disconnected;
    }

    /// Forget the paired device.
    pub fn forget_paired(&mut self) {
        self.paired = None;
    }

    /// Add a node by hand.
    pub fn add_node(&mut self, node: NewNode) -> Option<DeviceNode> {
        self.registry.add(node)
    }

    /// Update a node.
    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> Option<DeviceNode> {
        self.registry.update(id, patch)
    }

    /// Remove a node.
    pub fn remove_node(&mut self, id: &str) -> Option<DeviceNode> {
        self.registry.remove(id)
    }
}

fn initial_source_status(settings: &UserSettings) -> ConnectionStatus {
    if settings.demo_mode {
        ConnectionStatus::Connected
    } else if settings.has_cloud_channel() {
        ConnectionStatus::Connecting
    } else {
        ConnectionStatus::Disconnected
    }
}
