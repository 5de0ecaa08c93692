//! Cloud telemetry: the channel client and the periodic poller.
//!
//! The gateway publishes samples to a ThingSpeak-style channel. The poller
//! reads the channel's latest entry once on activation and then every
//! [`CloudPoller::interval`], reporting each result to the core as a
//! [`PollReport`].
//!
//! ```text
//! GET {endpoint}/channels/{id}/feeds/last.json[?api_key=KEY]
//! GET {endpoint}/channels/{id}/feeds.json?results=N[&api_key=KEY]
//! ```
//!
//! Payload fields are read defensively: `field1`..`field3` may be strings,
//! numbers or null, and anything that fails numeric parsing reads as zero.
//! An entry without `created_at` means the channel has no data yet.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use smartguard_types::{ConnectionStatus, TelemetrySample, UserSettings};

use crate::error::{Error, Result};
use crate::task::RepeatingTask;

/// Default telemetry host.
pub const DEFAULT_ENDPOINT: &str = "https://api.thingspeak.com";

/// Default interval between polls (the service's rate limit).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies a cloud channel and its optional read key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Channel identifier.
    pub channel_id: String,
    /// Read key, if the channel is private.
    pub read_key: Option<String>,
}

impl ChannelConfig {
    /// Create a channel config.
    pub fn new(channel_id: impl Into<String>, read_key: Option<String>) -> Self {
        Self {
            channel_id: channel_id.into().trim().to_string(),
            read_key: read_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Channel configured in `settings`.
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self::new(
            settings.channel_id.clone(),
            settings.read_key().map(str::to_string),
        )
    }

    /// Whether the channel id is set (not empty and not the `"0"` sentinel).
    pub fn is_configured(&self) -> bool {
        !self.channel_id.is_empty() && self.channel_id != smartguard_types::UNSET_CHANNEL_ID
    }
}

/// Source of cloud telemetry.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Latest sample on the channel, or `None` if the channel has no data.
    async fn latest(&self, channel: &ChannelConfig) -> Result<Option<TelemetrySample>>;

    /// Up to `results` most recent samples, oldest first.
    async fn history(&self, channel: &ChannelConfig, results: usize)
    -> Result<Vec<TelemetrySample>>;
}

/// HTTP client for the telemetry endpoint.
#[derive(Debug, Clone)]
pub struct TelemetryClient {
    client: Client,
    base_url: String,
}

impl TelemetryClient {
    /// Create a client for `base_url` with the default request timeout.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client whose requests time out after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "endpoint must start with http:// or https://, got: {base_url}"
            )));
        }

        Ok(Self { client, base_url })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn channel_url(&self, channel: &ChannelConfig, resource: &str) -> String {
        format!(
            "{}/channels/{}/{}",
            self.base_url, channel.channel_id, resource
        )
    }

    async fn get(
        &self,
        url: &str,
        channel: &ChannelConfig,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let mut request = self.client.get(url).query(query);
        if let Some(key) = &channel.read_key {
            request = request.query(&[("api_key", key)]);
        }
        let response = request.send().await?;
        handle_response(response).await
    }
}

#[async_trait]
impl TelemetrySource for TelemetryClient {
    async fn latest(&self, channel: &ChannelConfig) -> Result<Option<TelemetrySample>> {
        let url = self.channel_url(channel, "feeds/last.json");
        debug!(channel = %channel.channel_id, "Fetching latest sample");
        let body = self.get(&url, channel, &[]).await?;
        Ok(parse_entry(&body))
    }

    async fn history(
        &self,
        channel: &ChannelConfig,
        results: usize,
    ) -> Result<Vec<TelemetrySample>> {
        let url = self.channel_url(channel, "feeds.json");
        debug!(channel = %channel.channel_id, results, "Fetching history");
        let body = self
            .get(&url, channel, &[("results", results.to_string())])
            .await?;
        parse_feed(&body)
    }
}

async fn handle_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| status.to_string());

    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

/// Parse one channel entry.
///
/// Returns `None` for anything without a usable `created_at` (an empty
/// channel answers `-1`).
pub fn parse_entry(entry: &Value) -> Option<TelemetrySample> {
    let created_at = entry.get("created_at")?.as_str()?;
    let timestamp = match OffsetDateTime::parse(created_at, &Rfc3339) {
        Ok(ts) => ts,
        Err(e) => {
            warn!("Ignoring entry with bad created_at '{created_at}': {e}");
            return None;
        }
    };

    Some(TelemetrySample {
        ppm: parse_field(entry.get("field1")),
        temperature: parse_field(entry.get("field2")),
        humidity: parse_field(entry.get("field3")),
        timestamp,
    })
}

/// Parse a `feeds.json` body into samples, oldest first.
pub fn parse_feed(body: &Value) -> Result<Vec<TelemetrySample>> {
    let feeds = body
        .get("feeds")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::invalid_data("response has no 'feeds' array"))?;

    let mut samples: Vec<TelemetrySample> = feeds.iter().filter_map(parse_entry).collect();
    samples.sort_by_key(|s| s.timestamp);
    Ok(samples)
}

fn parse_field(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A timestamped sample.
    Sample(TelemetrySample),
    /// The channel answered but has no entries yet.
    NoData,
    /// No channel is configured; no request was made.
    Unconfigured,
    /// The request failed.
    Failed(String),
}

impl PollOutcome {
    /// Connector status this outcome reports.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            PollOutcome::Sample(_) => ConnectionStatus::Connected,
            PollOutcome::NoData | PollOutcome::Unconfigured => ConnectionStatus::Disconnected,
            PollOutcome::Failed(_) => ConnectionStatus::Error,
        }
    }
}

/// A poll outcome tagged with the generation of the poller that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    /// Source generation at the time the poller was started.
    pub generation: u64,
    /// What the poll found.
    pub outcome: PollOutcome,
}

/// Poll `channel` once.
///
/// An unconfigured channel short-circuits without touching `source`.
pub async fn poll(
    source: &dyn TelemetrySource,
    channel: &ChannelConfig,
    timeout: Duration,
) -> PollOutcome {
    if !channel.is_configured() {
        return PollOutcome::Unconfigured;
    }

    match tokio::time::timeout(timeout, source.latest(channel)).await {
        Ok(Ok(Some(sample))) => PollOutcome::Sample(sample),
        Ok(Ok(None)) => PollOutcome::NoData,
        Ok(Err(e)) => {
            warn!(channel = %channel.channel_id, "Cloud poll failed: {e}");
            PollOutcome::Failed(e.to_string())
        }
        Err(_) => {
            let e = Error::timeout("cloud poll", timeout);
            warn!(channel = %channel.channel_id, "{e}");
            PollOutcome::Failed(e.to_string())
        }
    }
}

/// Spawns the repeating cloud poll.
#[derive(Clone)]
pub struct CloudPoller {
    source: Arc<dyn TelemetrySource>,
    interval: Duration,
    request_timeout: Duration,
}

impl std::fmt::Debug for CloudPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudPoller")
            .field("interval", &self.interval)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl CloudPoller {
    /// Create a poller over `source`.
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            source,
            interval,
            request_timeout,
        }
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `channel`, sending each outcome to `reports`.
    ///
    /// Polls run one at a time; the request timeout keeps a hung request
    /// from delaying more than one tick. The task stops when the returned
    /// guard is dropped or `reports` closes.
    pub fn start(
        &self,
        channel: ChannelConfig,
        generation: u64,
        reports: mpsc::Sender<PollReport>,
    ) -> RepeatingTask {
        let source = Arc::clone(&self.source);
        let timeout = self.request_timeout;
        let channel = Arc::new(channel);

        RepeatingTask::spawn("cloud-poll", self.interval, move || {
            let source = Arc::clone(&source);
            let channel = Arc::clone(&channel);
            let reports = reports.clone();
            async move {
                let outcome = poll(source.as_ref(), &channel, timeout).await;
                let report = PollReport {
                    generation,
                    outcome,
                };
                match reports.send(report).await {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(()),
                }
            }
        })
    }
}
