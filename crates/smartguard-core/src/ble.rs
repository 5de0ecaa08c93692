//! Bluetooth LE transport for gateways.
//!
//! Pairing scans for peripherals advertising the SmartGuard mesh service,
//! connects to the strongest one, subscribes to the packet characteristic
//! and forwards each notification payload as a [`LinkEvent::Frame`].
//! Re-linking only looks for the peripheral paired earlier; it never picks
//! a new device.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use smartguard_types::uuids::{MESH_SERVICE, PACKET_CHARACTERISTIC};

use crate::error::{Error, Result, TransportFailure};
use crate::mesh::{FRAME_BUFFER, LinkEvent, MeshSession, MeshTransport, PairedDevice};

const SCAN_POLL: Duration = Duration::from_millis(500);

/// Timeouts for BLE operations.
#[derive(Debug, Clone)]
pub struct BleOptions {
    /// How long to scan for a gateway.
    pub scan_duration: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Service discovery timeout.
    pub discovery_timeout: Duration,
}

impl Default for BleOptions {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(10),
        }
    }
}

/// [`MeshTransport`] over the host's first Bluetooth adapter.
#[derive(Debug, Clone, Default)]
pub struct BleMeshTransport {
    options: BleOptions,
}

impl BleMeshTransport {
    /// Create a transport with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with custom timeouts.
    pub fn with_options(options: BleOptions) -> Self {
        Self { options }
    }

    async fn adapter(&self) -> Result<Adapter> {
        let manager = Manager::new().await.map_err(map_ble)?;
        let adapters = manager.adapters().await.map_err(map_ble)?;
        adapters
            .into_iter()
            .next()
            .ok_or(Error::Transport(TransportFailure::NoAdapter))
    }

    /// Scan until `pick` accepts a peripheral or the scan window closes.
    async fn scan<F>(&self, adapter: &Adapter, mut pick: F) -> Result<Option<Peripheral>>
    where
        F: FnMut(&PeripheralId, &PeripheralProperties) -> bool,
    {
        adapter
            .start_scan(ScanFilter {
                services: vec![MESH_SERVICE],
            })
            .await
            .map_err(map_ble)?;

        let deadline = Instant::now() + self.options.scan_duration;
        let mut best: Option<(Peripheral, i16)> = None;
        let found = loop {
            for peripheral in adapter.peripherals().await.map_err(map_ble)? {
                let Ok(Some(props)) = peripheral.properties().await else {
                    continue;
                };
                if !props.services.contains(&MESH_SERVICE) {
                    continue;
                }
                if !pick(&peripheral.id(), &props) {
                    continue;
                }
                let rssi = props.rssi.unwrap_or(i16::MIN);
                if best.as_ref().is_none_or(|(_, r)| rssi > *r) {
                    best = Some((peripheral, rssi));
                }
            }
            if best.is_some() || Instant::now() >= deadline {
                break best.map(|(p, _)| p);
            }
            sleep(SCAN_POLL).await;
        };

        if let Err(e) = adapter.stop_scan().await {
            warn!("Failed to stop scan: {e}");
        }
        Ok(found)
    }

    async fn open(&self, adapter: &Adapter, peripheral: Peripheral) -> Result<MeshSession> {
        let props = peripheral
            .properties()
            .await
            .map_err(map_ble)?
            .unwrap_or_default();
        let device = PairedDevice::new(
            create_identifier(&props.address.to_string(), &peripheral.id()),
            props.local_name.clone(),
        );
        info!(device = %device.id, "Connecting to gateway");

        timeout(self.options.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect", self.options.connect_timeout))?
            .map_err(map_ble)?;

        timeout(self.options.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.options.discovery_timeout))?
            .map_err(map_ble)?;

        let Some(characteristic) = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == PACKET_CHARACTERISTIC && c.service_uuid == MESH_SERVICE)
        else {
            let _ = peripheral.disconnect().await;
            return Err(TransportFailure::IncompatibleDevice.into());
        };

        peripheral.subscribe(&characteristic).await.map_err(map_ble)?;
        let mut notifications = peripheral.notifications().await.map_err(map_ble)?;
        let mut central = adapter.events().await.map_err(map_ble)?;

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let id = peripheral.id();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    notification = notifications.next() => match notification {
                        Some(n) if n.uuid == PACKET_CHARACTERISTIC => {
                            if tx.send(LinkEvent::Frame(n.value)).await.is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => {
                            let _ = tx
                                .send(LinkEvent::Lost("notification stream ended".into()))
                                .await;
                            break;
                        }
                    },
                    Some(event) = central.next() => {
                        if let CentralEvent::DeviceDisconnected(gone) = event
                            && gone == id
                        {
                            let _ = tx.send(LinkEvent::Lost("device disconnected".into())).await;
                            break;
                        }
                    }
                }
            }
            if peripheral.is_connected().await.unwrap_or(false)
                && let Err(e) = peripheral.disconnect().await
            {
                debug!("Disconnect failed: {e}");
            }
        });

        Ok(MeshSession {
            device,
            events: rx,
            cancel,
        })
    }
}

#[async_trait]
impl MeshTransport for BleMeshTransport {
    #[tracing::instrument(level = "info", skip_all)]
    async fn pair(&self) -> Result<MeshSession> {
        let adapter = self.adapter().await?;
        let peripheral = self
            .scan(&adapter, |_, _| true)
            .await?
            .ok_or(Error::Transport(TransportFailure::NoDeviceSelected))?;
        self.open(&adapter, peripheral).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(device = %device.id))]
    async fn reconnect(&self, device: &PairedDevice) -> Result<MeshSession> {
        let adapter = self.adapter().await?;
        let peripheral = self
            .scan(&adapter, |id, props| {
                create_identifier(&props.address.to_string(), id) == device.id
            })
            .await?
            .ok_or(Error::Transport(TransportFailure::LinkLost))?;
        self.open(&adapter, peripheral).await
    }
}

/// Format a peripheral id as a plain string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Stable identifier for a peripheral.
///
/// Platforms that hide the address (reported as all zeros) fall back to the
/// peripheral id.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    identifier_or(address, || format_peripheral_id(peripheral_id))
}

fn identifier_or(address: &str, fallback: impl FnOnce() -> String) -> String {
    if address == "00:00:00:00:00:00" {
        fallback()
    } else {
        address.to_string()
    }
}

fn map_ble(error: btleplug::Error) -> Error {
    match error {
        btleplug::Error::PermissionDenied => TransportFailure::PermissionDenied.into(),
        btleplug::Error::NotSupported(_) => TransportFailure::Unsupported.into(),
        other => Error::Bluetooth(other),
    }
}
