//! Report command implementation.
//!
//! Takes one reading from the configured source and composes an incident
//! report from it. The mesh is not consulted and demo mode never rolls a
//! synthetic alert here; use `monitor` and press `r` for a report that
//! includes live alerts.

use std::path::PathBuf;

use anyhow::Result;
use smartguard_core::cloud::{self, DEFAULT_REQUEST_TIMEOUT};
use smartguard_core::demo::DEFAULT_ALERT_PROBABILITY;
use smartguard_core::{
    ChannelConfig, DemoGenerator, DemoTick, IncidentReport, PollReport, SafetyState,
    TelemetryClient, TelemetrySource,
};
use smartguard_store::Store;
use time::OffsetDateTime;

use crate::util::write_output;

pub async fn cmd_report(store: &Store, endpoint: &str, output: Option<&PathBuf>) -> Result<()> {
    let source = TelemetryClient::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)?;
    let mut demo = DemoGenerator::new(DEFAULT_ALERT_PROBABILITY);
    let report = compose(store, &source, &mut demo).await?;
    write_output(output, &format!("{report}\n"))
}

async fn compose(
    store: &Store,
    source: &dyn TelemetrySource,
    demo: &mut DemoGenerator,
) -> Result<IncidentReport> {
    let mut state = SafetyState::new(store.load_settings()?, store.load_nodes()?);
    let now = OffsetDateTime::now_utc();

    if state.demo_active() {
        state.apply_demo(DemoTick {
            sample: demo.sample(now),
            alert: None,
        });
    } else {
        let channel = ChannelConfig::from_settings(state.settings());
        let outcome = cloud::poll(source, &channel, DEFAULT_REQUEST_TIMEOUT).await;
        let generation = state.generation();
        state.apply_poll(PollReport {
            generation,
            outcome,
        });
    }

    Ok(IncidentReport::compose(&state.snapshot(), now))
}
