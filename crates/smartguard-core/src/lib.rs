//! Core library for SmartGuard gas-safety monitoring.
//!
//! Three sources can feed the dashboard at once:
//!
//! - **Cloud**: a periodic poll of the gateway's telemetry channel
//! - **Local mesh**: a Bluetooth LE link to a gateway relaying node packets
//! - **Demo**: synthetic readings for running without hardware
//!
//! [`SafetyCore`] reconciles them into one authoritative view. A local
//! emergency alert always wins until the user clears it; otherwise demo mode
//! or the cloud channel supplies the gateway reading, and the threshold
//! classifier turns that reading into a [`Status`]. Nodes heard over the mesh
//! are kept in a [`NodeRegistry`].
//!
//! The pure reconciliation rules live in [`reconcile::SafetyState`], which
//! can be driven directly in tests without any timers or I/O.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use smartguard_core::{BleMeshTransport, SafetyCore, SafetyEvent, UserSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = UserSettings {
//!         channel_id: "2512345".to_string(),
//!         ..Default::default()
//!     };
//!     let core = SafetyCore::builder()
//!         .settings(settings)
//!         .transport(Arc::new(BleMeshTransport::new()))
//!         .spawn()?;
//!
//!     let mut events = core.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if let SafetyEvent::StatusChanged { to, .. } = event {
//!             println!("Status: {to}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod cloud;
pub mod demo;
pub mod error;
pub mod events;
pub mod export;
pub mod history;
pub mod mesh;
pub mod mock;
pub mod notifier;
pub mod reconcile;
pub mod reconnect;
pub mod registry;
pub mod report;
pub mod service;
pub mod task;
pub mod thresholds;

pub use ble::{BleMeshTransport, BleOptions};
pub use cloud::{
    ChannelConfig, CloudPoller, PollOutcome, PollReport, TelemetryClient, TelemetrySource,
};
pub use demo::{DemoGenerator, DemoTick};
pub use error::{Error, Result, TransportFailure};
pub use events::{EventDispatcher, EventReceiver, EventSender, NoticeLevel, SafetyEvent};
pub use history::{History, HistoryOrigin, HistoryRange, HistorySummary};
pub use mesh::{LinkEvent, MeshSession, MeshTransport, PairedDevice};
pub use mock::{MockMeshTransport, MockTelemetrySource};
pub use notifier::{AlertNotifier, LogNotifier, RecordingNotifier};
pub use reconcile::{DisplayReading, SafetySnapshot, SafetyState};
pub use reconnect::ReconnectOptions;
pub use registry::{NewNode, NodePatch, NodeRegistry};
pub use report::IncidentReport;
pub use service::{CoreOptions, SafetyCore, SafetyCoreBuilder, SafetyHandle};
pub use task::RepeatingTask;
pub use thresholds::{Thresholds, classify};

// Re-export from smartguard-types
pub use smartguard_types::uuid as uuids;
pub use smartguard_types::{
    ConnectionState, ConnectionStatus, ConnectionType, DataSource, DeviceNode, GatewayTelemetry,
    MeshAlert, MeshPacket, NodeRole, Status, TelemetrySample, Theme, UserSettings,
};
