//! Proximity (mesh) listener plumbing.
//!
//! A [`MeshTransport`] pairs with a gateway and hands back a [`MeshSession`]:
//! a channel of [`LinkEvent`]s plus a cancellation token that tears the link
//! down. Frames are decoded with [`decode_frame`]; malformed frames are
//! logged and dropped, never propagated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use smartguard_types::MeshPacket;

use crate::error::Result;

/// Frames buffered between the transport and the core.
pub const FRAME_BUFFER: usize = 64;

/// A gateway that has been paired at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    /// Platform identifier of the peripheral.
    pub id: String,
    /// Advertised name, if any.
    pub name: Option<String>,
}

impl PairedDevice {
    /// Create a paired device record.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// Name for display, falling back to the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Raw notification payload.
    Frame(Vec<u8>),
    /// The link dropped without the user asking.
    Lost(String),
}

/// An open link to a gateway.
#[derive(Debug)]
pub struct MeshSession {
    /// The linked gateway.
    pub device: PairedDevice,
    /// Incoming frames. A closed channel counts as a lost link.
    pub events: mpsc::Receiver<LinkEvent>,
    /// Cancel to disconnect.
    pub cancel: CancellationToken,
}

impl MeshSession {
    /// Close the link.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Short-range transport carrying text packets from gateways.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Discover and pair a gateway.
    ///
    /// Only ever called in response to an explicit user action.
    async fn pair(&self) -> Result<MeshSession>;

    /// Re-open a link to a gateway paired earlier, without discovery of new
    /// devices.
    async fn reconnect(&self, device: &PairedDevice) -> Result<MeshSession>;
}

/// Decode a notification payload into a packet.
///
/// Returns `None` (after logging) for non-UTF-8 or malformed frames.
pub fn decode_frame(frame: &[u8]) -> Option<MeshPacket> {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!("Dropping non-UTF-8 frame ({} bytes): {e}", frame.len());
            return None;
        }
    };

    match MeshPacket::parse(text) {
        Ok(packet) => Some(packet),
        Err(e) => {
            warn!("Dropping malformed packet {text:?}: {e}");
            None
        }
    }
}
