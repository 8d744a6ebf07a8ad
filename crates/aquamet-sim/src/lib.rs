//! Wi-Fi network simulation toolkit for exercising the handover engine.
//!
//! Provides an in-memory controller ([`network::SimNetwork`]) and
//! deterministic, seeded telemetry generation ([`scenario::Scenario`]) for
//! testing handover behaviour under controlled radio conditions.

pub mod network;
pub mod scenario;

use aquamet_core::{Controller, EngineEvent, HandoverEngine, TickReport};
use tracing::debug;

use crate::scenario::Scenario;

/// Bootstraps `engine` from `scenario` and runs `ticks` ticks in lock-step.
/// Events raised while ingesting are folded into the report of the tick
/// they preceded.
pub fn drive<C: Controller>(
    engine: &mut HandoverEngine<C>,
    scenario: &mut Scenario,
    ticks: u64,
) -> Vec<TickReport> {
    for t in scenario.bootstrap() {
        engine.ingest(t);
    }
    engine.tick();

    let mut reports = Vec::with_capacity(ticks as usize);
    for _ in 0..ticks {
        let mut ingest_events: Vec<EngineEvent> = Vec::new();
        for t in scenario.step() {
            ingest_events.extend(engine.ingest(t));
        }
        let mut report = engine.tick();
        debug!(tick = report.tick, events = report.events.len(), "simulated tick");
        ingest_events.append(&mut report.events);
        report.events = ingest_events;
        reports.push(report);
    }
    reports
}
