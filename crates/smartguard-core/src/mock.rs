//! In-memory telemetry source and mesh transport for tests and demos.
//!
//! Both mocks support failure injection and artificial latency, and count
//! the calls made against them so tests can assert that a code path did
//! (or did not) reach the network.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use smartguard_types::TelemetrySample;

use crate::cloud::{ChannelConfig, TelemetrySource};
use crate::error::{Error, Result, TransportFailure};
use crate::mesh::{FRAME_BUFFER, LinkEvent, MeshSession, MeshTransport, PairedDevice};

/// A scripted cloud channel.
///
/// ```
/// use smartguard_core::mock::MockTelemetrySource;
/// use smartguard_core::cloud::{ChannelConfig, TelemetrySource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source = MockTelemetrySource::new();
/// let latest = source.latest(&ChannelConfig::new("42", None)).await.unwrap();
/// assert!(latest.is_none());
/// assert_eq!(source.latest_calls(), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockTelemetrySource {
    latest: RwLock<Option<TelemetrySample>>,
    history: RwLock<Vec<TelemetrySample>>,
    failure: RwLock<Option<String>>,
    latency: RwLock<Duration>,
    latest_calls: AtomicU32,
    history_calls: AtomicU32,
}

impl MockTelemetrySource {
    /// A channel with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose latest entry is `sample`.
    pub fn with_latest(sample: TelemetrySample) -> Self {
        Self {
            latest: RwLock::new(Some(sample)),
            ..Default::default()
        }
    }

    /// Replace the latest entry.
    pub async fn set_latest(&self, sample: Option<TelemetrySample>) {
        *self.latest.write().await = sample;
    }

    /// Replace the feed returned by `history`.
    pub async fn set_history(&self, samples: Vec<TelemetrySample>) {
        *self.history.write().await = samples;
    }

    /// Make every request fail with `message` (or succeed again with `None`).
    pub async fn set_failure(&self, message: Option<&str>) {
        *self.failure.write().await = message.map(str::to_string);
    }

    /// Delay every request by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = latency;
    }

    /// Number of `latest` calls made.
    pub fn latest_calls(&self) -> u32 {
        self.latest_calls.load(Ordering::Relaxed)
    }

    /// Number of `history` calls made.
    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::Relaxed)
    }

    async fn simulate(&self) -> Result<()> {
        let latency = *self.latency.read().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.failure.read().await.as_ref() {
            Some(message) => Err(Error::Api {
                status: 503,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetrySource {
    async fn latest(&self, _channel: &ChannelConfig) -> Result<Option<TelemetrySample>> {
        self.latest_calls.fetch_add(1, Ordering::Relaxed);
        // the channel is read when the request is issued, not when it lands
        let latest = *self.latest.read().await;
        self.simulate().await?;
        Ok(latest)
    }

    async fn history(
        &self,
        _channel: &ChannelConfig,
        results: usize,
    ) -> Result<Vec<TelemetrySample>> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate().await?;
        let history = self.history.read().await;
        let skip = history.len().saturating_sub(results);
        Ok(history[skip..].to_vec())
    }
}

struct OpenLink {
    frames: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
}

/// A scripted gateway link.
///
/// Pairing hands back a session whose frames are injected with
/// [`send_frame`](Self::send_frame). Link loss is simulated with
/// [`drop_link`](Self::drop_link).
pub struct MockMeshTransport {
    device: PairedDevice,
    pair_failure: Mutex<Option<TransportFailure>>,
    reconnect_failures: AtomicU32,
    latency: Mutex<Duration>,
    link: Mutex<Option<OpenLink>>,
    pair_calls: AtomicU32,
    reconnect_calls: AtomicU32,
}

impl std::fmt::Debug for MockMeshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMeshTransport")
            .field("device", &self.device)
            .field("linked", &self.is_linked())
            .finish_non_exhaustive()
    }
}

impl Default for MockMeshTransport {
    fn default() -> Self {
        Self::new(PairedDevice::new(
            "AA:BB:CC:DD:EE:01",
            Some("SmartGuard-Gateway".to_string()),
        ))
    }
}

impl MockMeshTransport {
    /// A transport that pairs with `device`.
    pub fn new(device: PairedDevice) -> Self {
        Self {
            device,
            pair_failure: Mutex::new(None),
            reconnect_failures: AtomicU32::new(0),
            latency: Mutex::new(Duration::ZERO),
            link: Mutex::new(None),
            pair_calls: AtomicU32::new(0),
            reconnect_calls: AtomicU32::new(0),
        }
    }

    /// The device this transport pairs with.
    pub fn device(&self) -> &PairedDevice {
        &self.device
    }

    /// Make pairing fail with `failure` (or succeed again with `None`).
    pub fn set_pair_failure(&self, failure: Option<TransportFailure>) {
        if let Ok(mut slot) = self.pair_failure.lock() {
            *slot = failure;
        }
    }

    /// Fail the next `count` re-link attempts.
    pub fn fail_reconnects(&self, count: u32) {
        self.reconnect_failures.store(count, Ordering::Relaxed);
    }

    /// Delay pairing and re-linking by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    /// Number of pairing attempts.
    pub fn pair_calls(&self) -> u32 {
        self.pair_calls.load(Ordering::Relaxed)
    }

    /// Number of re-link attempts.
    pub fn reconnect_calls(&self) -> u32 {
        self.reconnect_calls.load(Ordering::Relaxed)
    }

    /// Whether a session is open and has not been closed by its owner.
    pub fn is_linked(&self) -> bool {
        self.link
            .lock()
            .map(|link| {
                link.as_ref()
                    .is_some_and(|l| !l.cancel.is_cancelled() && !l.frames.is_closed())
            })
            .unwrap_or(false)
    }

    fn sender(&self) -> Option<mpsc::Sender<LinkEvent>> {
        let link = self.link.lock().ok()?;
        link.as_ref()
            .filter(|l| !l.cancel.is_cancelled())
            .map(|l| l.frames.clone())
    }

    /// Deliver a raw frame on the open link. Returns `false` if none is open.
    pub async fn send_bytes(&self, frame: Vec<u8>) -> bool {
        match self.sender() {
            Some(tx) => tx.send(LinkEvent::Frame(frame)).await.is_ok(),
            None => false,
        }
    }

    /// Deliver a text frame on the open link.
    pub async fn send_frame(&self, frame: &str) -> bool {
        self.send_bytes(frame.as_bytes().to_vec()).await
    }

    /// Drop the open link as if the gateway went out of range.
    pub async fn drop_link(&self, reason: &str) -> bool {
        let Some(tx) = self.sender() else {
            return false;
        };
        let sent = tx.send(LinkEvent::Lost(reason.to_string())).await.is_ok();
        if let Ok(mut link) = self.link.lock() {
            *link = None;
        }
        sent
    }

    async fn delay(&self) {
        let latency = self.latency.lock().map(|l| *l).unwrap_or_default();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn open(&self) -> MeshSession {
        let (frames, events) = mpsc::channel(FRAME_BUFFER);
        let cancel = CancellationToken::new();
        if let Ok(mut link) = self.link.lock() {
            *link = Some(OpenLink {
                frames,
                cancel: cancel.clone(),
            });
        }
        MeshSession {
            device: self.device.clone(),
            events,
            cancel,
        }
    }
}

#[async_trait]
impl MeshTransport for MockMeshTransport {
    async fn pair(&self) -> Result<MeshSession> {
        self.pair_calls.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        let failure = self.pair_failure.lock().ok().and_then(|f| f.clone());
        match failure {
            Some(failure) => Err(failure.into()),
            None => Ok(self.open()),
        }
    }

    async fn reconnect(&self, device: &PairedDevice) -> Result<MeshSession> {
        self.reconnect_calls.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        if device.id != self.device.id {
            return Err(TransportFailure::LinkLost.into());
        }
        let remaining = self.reconnect_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.reconnect_failures.store(remaining - 1, Ordering::Relaxed);
            return Err(TransportFailure::LinkLost.into());
        }
        Ok(self.open())
    }
}
