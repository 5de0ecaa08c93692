//! Platform-agnostic types for SmartGuard gas-safety monitoring.
//!
//! This crate holds the data model shared by the core, the store and the
//! CLI: telemetry, connection state, nodes, settings, and the text packet
//! codec used on the proximity channel. It performs no I/O.
//!
//! # Example
//!
//! ```
//! use smartguard_types::{MeshPacket, Status, UserSettings};
//!
//! let settings = UserSettings::default();
//! assert_eq!(settings.danger_threshold, 2500.0);
//!
//! let packet: MeshPacket = "DATA:N1:420:21.5:40".parse().unwrap();
//! assert!(!packet.is_alert());
//! assert!(Status::Danger > Status::Safe);
//! ```

pub mod error;
pub mod packet;
pub mod settings;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use packet::MeshPacket;
pub use settings::{Theme, UNSET_CHANNEL_ID, UserSettings, ValidationError};
pub use types::{
    ConnectionState, ConnectionStatus, ConnectionType, DataSource, DeviceNode, GatewayTelemetry,
    MeshAlert, NodeRole, Status, TelemetrySample,
};
pub use uuid as uuids;
