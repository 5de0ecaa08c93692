//! Core types for SmartGuard telemetry and safety state.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Safety status derived from a gas concentration.
///
/// # Ordering
///
/// Status values are ordered by severity: `Safe < Warning < Danger`.
/// This allows comparisons like `if status >= Status::Warning { ... }`.
///
/// ```
/// use smartguard_types::Status;
///
/// assert!(Status::Danger > Status::Warning);
/// assert!(Status::Warning > Status::Safe);
/// assert_eq!(Status::Danger.to_string(), "Danger");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Status {
    /// Concentration below the warning threshold.
    #[default]
    Safe,
    /// Concentration at or above the warning threshold.
    Warning,
    /// Concentration at or above the danger threshold, or an active local alert.
    Danger,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Safe => write!(f, "Safe"),
            Status::Warning => write!(f, "Warning"),
            Status::Danger => write!(f, "Danger"),
        }
    }
}

/// Kind of link the gateway view is currently served over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ConnectionType {
    /// Short-range proximity transport (BLE).
    BluetoothProximity,
    /// Cloud telemetry over the network.
    Network,
    /// Synthetic demo data.
    Demo,
    /// No source.
    Offline,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::BluetoothProximity => write!(f, "Bluetooth"),
            ConnectionType::Network => write!(f, "Network"),
            ConnectionType::Demo => write!(f, "Demo"),
            ConnectionType::Offline => write!(f, "Offline"),
        }
    }
}

/// Link status reported for a connector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionStatus {
    /// Data is flowing.
    Connected,
    /// A link or first fetch is in progress.
    Connecting,
    /// No link, or no data yet.
    #[default]
    Disconnected,
    /// The last attempt failed.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Pair of connection type and status.
///
/// A `Connected` status never pairs with [`ConnectionType::Offline`];
/// [`ConnectionState::new`] downgrades such a pair to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "RawConnectionState"))]
pub struct ConnectionState {
    kind: ConnectionType,
    status: ConnectionStatus,
}

/// Wire form of [`ConnectionState`]; decoding goes through [`ConnectionState::new`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawConnectionState {
    kind: ConnectionType,
    status: ConnectionStatus,
}

#[cfg(feature = "serde")]
impl From<RawConnectionState> for ConnectionState {
    fn from(raw: RawConnectionState) -> Self {
        Self::new(raw.kind, raw.status)
    }
}

impl ConnectionState {
    /// Create a connection state.
    ///
    /// ```
    /// use smartguard_types::{ConnectionState, ConnectionStatus, ConnectionType};
    ///
    /// let state = ConnectionState::new(ConnectionType::Offline, ConnectionStatus::Connected);
    /// assert_eq!(state.status(), ConnectionStatus::Disconnected);
    /// ```
    #[must_use]
    pub fn new(kind: ConnectionType, status: ConnectionStatus) -> Self {
        let status = match (kind, status) {
            (ConnectionType::Offline, ConnectionStatus::Connected) => {
                ConnectionStatus::Disconnected
            }
            (_, status) => status,
        };
        Self { kind, status }
    }

    /// The offline/disconnected state.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            kind: ConnectionType::Offline,
            status: ConnectionStatus::Disconnected,
        }
    }

    /// Connection type.
    pub fn kind(&self) -> ConnectionType {
        self.kind
    }

    /// Connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether data is flowing.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::offline()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)
    }
}

/// Which connector's data is authoritative for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DataSource {
    /// Cloud polling.
    Cloud,
    /// Active local emergency alert.
    LocalMesh,
    /// Synthetic demo generator.
    Demo,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Cloud => write!(f, "cloud"),
            DataSource::LocalMesh => write!(f, "local-mesh"),
            DataSource::Demo => write!(f, "demo"),
        }
    }
}

/// One timestamped telemetry sample produced by the cloud or demo connector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelemetrySample {
    /// Gas concentration in ppm.
    pub ppm: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage (0-100).
    pub humidity: f64,
    /// When the sample was captured at the source.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

/// Last-known readings of the primary gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GatewayTelemetry {
    /// Gas concentration in ppm.
    pub ppm: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage (0-100).
    pub humidity: f64,
    /// Capture time of the last successful read (`None` until the first one).
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "time::serde::rfc3339::option")
    )]
    pub captured_at: Option<OffsetDateTime>,
}

impl GatewayTelemetry {
    /// Neutral telemetry: zero readings, never captured.
    #[must_use]
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Whether at least one sample has been received.
    pub fn has_data(&self) -> bool {
        self.captured_at.is_some()
    }
}

impl From<TelemetrySample> for GatewayTelemetry {
    fn from(sample: TelemetrySample) -> Self {
        Self {
            ppm: sample.ppm,
            temperature: sample.temperature,
            humidity: sample.humidity,
            captured_at: Some(sample.timestamp),
        }
    }
}

/// An emergency alert received over the proximity channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshAlert {
    /// Remote-reported id of the device raising the alert.
    pub source_device_id: String,
    /// Location reported by the device.
    pub location: String,
    /// Gas concentration reported with the alert.
    pub ppm: f64,
    /// When the alert was received.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub observed_at: OffsetDateTime,
}

/// Role of a node in the site network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NodeRole {
    /// The primary unit driving the main dashboard.
    Gateway,
    /// A remote sensor node.
    #[default]
    Node,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Gateway => write!(f, "gateway"),
            NodeRole::Node => write!(f, "node"),
        }
    }
}

/// A known remote sensor node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceNode {
    /// Locally generated id.
    pub id: String,
    /// Stable id reported by the remote device (absent for manually added nodes).
    #[cfg_attr(feature = "serde", serde(default))]
    pub device_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Installation location.
    pub location: String,
    /// Node role.
    #[cfg_attr(feature = "serde", serde(default))]
    pub role: NodeRole,
    /// Gas concentration in ppm.
    pub ppm: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Battery level percentage (0-100).
    pub battery: u8,
    /// Signal strength in dBm.
    pub signal: i16,
    /// Last status reported for this node.
    pub status: Status,
    /// When the node was last observed.
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "time::serde::rfc3339::option")
    )]
    pub last_seen: Option<OffsetDateTime>,
}
