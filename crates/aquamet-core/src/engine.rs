//! # Handover Decision Engine
//!
//! Owns every piece of sliding-window state for one deployment and runs the
//! per-tick decision loop for the monitored stations.
//!
//! A tick is two phases that never interleave:
//!
//! 1. **Ingest**: telemetry handlers (`on_*`) push samples and accumulate
//!    attempt/success deltas into slot 0 of each AP aggregate.
//! 2. **Commit**: [`HandoverEngine::tick`] admits newly joined nodes,
//!    evaluates the monitored stations, then rotates every connected AP's
//!    aggregate exactly once.
//!
//! Per monitored station:
//!
//! ```text
//! Unassociated → Warming(k < W) → Evaluating → Stable
//!                    ↑                  ↓
//!                    └──── HandingOver ←┘
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::airtime::{ContentionModel, satisfaction_probability};
use crate::config::EngineConfig;
use crate::controller::Controller;
use crate::error::EstimateError;
use crate::rate::estimated_rate_kbps;
use crate::stats::{
    ApSnapshot, EngineEvent, EngineSnapshot, LinkSnapshot, MonitoredSnapshot, QosPhase,
    TickReport,
};
use crate::traffic::{CounterSnapshot, RateHistogram, TrafficAggregator};
use crate::types::{AccessPoint, LinkKey, NodeId, RadioBlock};
use crate::window::{SampleStore, SignalSample};

pub const SNAPSHOT_SCHEMA_VERSION: i32 = 1;

/// Telemetry and topology notifications delivered by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    AccessPointUp(NodeId),
    AccessPointDown(NodeId),
    StationJoin(NodeId),
    StationLeave(NodeId),
    Signal {
        ap: NodeId,
        sta: NodeId,
        rssi_dbm: f64,
    },
    Counters {
        sta: NodeId,
        snapshot: CounterSnapshot,
    },
    RateHistogram {
        sta: NodeId,
        histogram: RateHistogram,
    },
}

/// QoS bookkeeping for one monitored station.
#[derive(Debug, Clone, Default)]
struct MonitoredStation {
    phase: QosPhase,
    /// Delivery samples collected since the last association change.
    samples: u64,
    serving: Option<RadioBlock>,
    p_good: Option<f64>,
}

pub struct HandoverEngine<C: Controller> {
    config: EngineConfig,
    controller: C,
    store: SampleStore,
    traffic: TrafficAggregator,
    monitored: BTreeMap<NodeId, MonitoredStation>,
    pending_aps: Vec<NodeId>,
    pending_stations: Vec<NodeId>,
    tick: u64,
}

impl<C: Controller> HandoverEngine<C> {
    pub fn new(config: EngineConfig, controller: C) -> Self {
        let monitored = config
            .monitored
            .iter()
            .map(|sta| (*sta, MonitoredStation::default()))
            .collect();
        HandoverEngine {
            store: SampleStore::new(config.window_depth),
            traffic: TrafficAggregator::new(config.tick),
            monitored,
            pending_aps: Vec::new(),
            pending_stations: Vec::new(),
            tick: 0,
            config,
            controller,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Start tracking QoS for `sta`. No-op if already monitored.
    pub fn monitor(&mut self, sta: NodeId) {
        self.monitored.entry(sta).or_default();
    }

    pub fn phase(&self, sta: NodeId) -> Option<QosPhase> {
        self.monitored.get(&sta).map(|m| m.phase)
    }

    pub fn sample_count(&self, sta: NodeId) -> Option<u64> {
        self.monitored.get(&sta).map(|m| m.samples)
    }

    // ─── Ingest phase ───────────────────────────────────────────────

    pub fn ingest(&mut self, telemetry: Telemetry) -> Vec<EngineEvent> {
        match telemetry {
            Telemetry::AccessPointUp(ap) => self.on_access_point_up(ap),
            Telemetry::AccessPointDown(ap) => self.on_access_point_down(ap),
            Telemetry::StationJoin(sta) => self.on_station_join(sta),
            Telemetry::StationLeave(sta) => self.on_station_leave(sta),
            Telemetry::Signal { ap, sta, rssi_dbm } => {
                return self.on_signal_sample(ap, sta, rssi_dbm);
            }
            Telemetry::Counters { sta, snapshot } => self.on_counter_sample(sta, &snapshot),
            Telemetry::RateHistogram { sta, histogram } => {
                self.on_rate_histogram_sample(sta, &histogram)
            }
        }
        Vec::new()
    }

    /// Queue an access point; its aggregates are created on the next tick.
    pub fn on_access_point_up(&mut self, ap: NodeId) {
        info!(tick = self.tick, ap = %ap, "access point up");
        if !self.pending_aps.contains(&ap) {
            self.pending_aps.push(ap);
        }
    }

    /// Queue a station; its series are created on the next tick.
    pub fn on_station_join(&mut self, sta: NodeId) {
        info!(tick = self.tick, sta = %sta, "station joined");
        if !self.pending_stations.contains(&sta) {
            self.pending_stations.push(sta);
        }
    }

    pub fn on_access_point_down(&mut self, ap: NodeId) {
        info!(tick = self.tick, ap = %ap, "access point down, dropping its series");
        self.pending_aps.retain(|p| *p != ap);
        self.store.remove_access_point(ap);
    }

    pub fn on_station_leave(&mut self, sta: NodeId) {
        info!(tick = self.tick, sta = %sta, "station left, dropping its series");
        self.pending_stations.retain(|p| *p != sta);
        self.store.remove_station(sta);
        self.traffic.forget(sta);
        if let Some(state) = self.monitored.get_mut(&sta) {
            *state = MonitoredStation::default();
        }
    }

    fn known_link(&self, ap: NodeId, sta: NodeId) -> Result<(), EstimateError> {
        if !self.store.has_access_point(ap) {
            return Err(EstimateError::MissingTopology {
                kind: "access point",
                node: ap,
            });
        }
        if !self.store.has_station(sta) {
            return Err(EstimateError::MissingTopology {
                kind: "station",
                node: sta,
            });
        }
        Ok(())
    }

    pub fn on_signal_sample(
        &mut self,
        ap: NodeId,
        sta: NodeId,
        rssi_dbm: f64,
    ) -> Vec<EngineEvent> {
        if let Err(e) = self.known_link(ap, sta) {
            warn!(error = %e, "dropping signal sample");
            return Vec::new();
        }

        let phy_rate_kbps = match estimated_rate_kbps(
            rssi_dbm,
            self.config.noise_floor_dbm,
            self.config.phy_standard,
        ) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(ap = %ap, sta = %sta, error = %e, "no usable PHY rate");
                None
            }
        };
        debug!(ap = %ap, sta = %sta, rssi_dbm, rate = ?phy_rate_kbps, "signal sample");
        self.store.push_signal(
            LinkKey::new(ap, sta),
            SignalSample {
                rssi_dbm,
                phy_rate_kbps,
            },
        );

        self.config
            .signal_triggers
            .iter()
            .filter(|t| t.matches(rssi_dbm))
            .map(|t| EngineEvent::SignalTriggered {
                ap,
                sta,
                relation: t.relation,
                threshold_dbm: t.threshold_dbm,
                rssi_dbm,
            })
            .collect()
    }

    pub fn on_counter_sample(&mut self, sta: NodeId, snapshot: &CounterSnapshot) {
        if !self.store.has_station(sta) {
            warn!(sta = %sta, "dropping counter sample for unknown station");
            return;
        }
        match self.traffic.on_counters(sta, snapshot) {
            Ok(sample) => {
                debug!(
                    sta = %sta,
                    arrival_pps = sample.arrival_pps,
                    frame_len = sample.frame_len_bytes,
                    "traffic sample"
                );
                self.store.push_traffic(sta, sample);
            }
            Err(e) => warn!(error = %e, "skipping traffic sample"),
        }
    }

    pub fn on_rate_histogram_sample(&mut self, sta: NodeId, histogram: &RateHistogram) {
        let Some(block) = self.controller.serving_block(sta) else {
            warn!(sta = %sta, "dropping rate histogram for unassociated station");
            return;
        };
        if let Err(e) = self.known_link(block.ap, sta) {
            warn!(error = %e, "dropping rate histogram");
            return;
        }

        let update = match self.traffic.on_histogram(sta, histogram) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "skipping delivery sample");
                return;
            }
        };
        let link = LinkKey::new(block.ap, sta);
        debug!(
            link = %link,
            pdr = update.sample.pdr,
            throughput_kbps = update.sample.throughput_kbps,
            rate = ?update.sample.selected_rate,
            "delivery sample"
        );
        self.store.push_delivery(link, update.sample);
        self.store
            .accumulate(block.ap, update.attempts, update.successes);

        if let Some(state) = self.monitored.get_mut(&sta) {
            state.samples += 1;
        }
    }

    // ─── Commit phase ───────────────────────────────────────────────

    /// Run one decision tick. Never panics on missing or malformed state;
    /// whatever cannot be evaluated is skipped for this tick.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut events = Vec::new();

        for ap in std::mem::take(&mut self.pending_aps) {
            self.store.add_access_point(ap);
        }
        for sta in std::mem::take(&mut self.pending_stations) {
            self.store.add_station(sta);
        }

        let aps = self.controller.access_points();
        let stations: Vec<NodeId> = self.monitored.keys().copied().collect();
        for sta in stations {
            self.evaluate_station(sta, &aps, &mut events);
        }

        for ap in aps.iter().filter(|ap| ap.connected) {
            self.store.rotate(ap.id);
        }

        TickReport {
            tick: self.tick,
            events,
        }
    }

    fn evaluate_station(
        &mut self,
        sta: NodeId,
        aps: &[AccessPoint],
        events: &mut Vec<EngineEvent>,
    ) {
        let depth = self.store.depth();
        let tick = self.tick;

        let serving = match self.controller.serving_block(sta) {
            Some(block) if self.store.has_station(sta) => block,
            _ => {
                debug!(tick, sta = %sta, "monitored station not associated");
                if let Some(state) = self.monitored.get_mut(&sta) {
                    *state = MonitoredStation::default();
                }
                return;
            }
        };

        let Some(state) = self.monitored.get_mut(&sta) else {
            return;
        };
        if let Some(previous) = state.serving.filter(|p| p.ap != serving.ap) {
            info!(tick, sta = %sta, from = %previous.ap, to = %serving.ap, "association changed");
            state.samples = 0;
            state.p_good = None;
            self.store.clear_delivery(LinkKey::new(previous.ap, sta));
        }
        state.serving = Some(serving);

        if state.samples < depth as u64 {
            debug!(tick, sta = %sta, samples = state.samples, "warming up");
            state.phase = QosPhase::Warming;
            return;
        }

        let link = LinkKey::new(serving.ap, sta);
        let Some(measured) = self.store.delivery(link).filter(|w| w.len() >= depth) else {
            let have = self.store.delivery(link).map(|w| w.len()).unwrap_or(0);
            let e = EstimateError::InsufficientHistory {
                link,
                have,
                need: depth,
            };
            debug!(tick, error = %e, "skipping QoS evaluation");
            state.phase = QosPhase::Warming;
            return;
        };

        let threshold = self.config.threshold_kbps;
        let p_good = satisfaction_probability(
            measured.iter().map(|d| &d.throughput_kbps),
            threshold,
            depth,
        );
        state.p_good = Some(p_good);
        info!(tick, sta = %sta, ap = %serving.ap, p_good, "measured QoS");

        if p_good >= self.config.tolerance {
            state.phase = QosPhase::Stable;
            return;
        }
        state.phase = QosPhase::Evaluating;
        events.push(EngineEvent::QosDegraded {
            sta,
            ap: serving.ap,
            p_good,
        });

        let mut best: Option<(RadioBlock, f64)> = None;
        let mut best_p = p_good;
        for ap in aps {
            if !ap.connected || ap.id == serving.ap {
                continue;
            }
            if !self.store.has_access_point(ap.id) {
                debug!(tick, ap = %ap.id, "candidate not yet admitted");
                continue;
            }
            let target = match self.target_block(ap, &serving) {
                Ok(block) => block,
                Err(e) => {
                    warn!(tick, error = %e, "skipping candidate");
                    continue;
                }
            };
            if target.channel == serving.channel {
                debug!(
                    tick,
                    ap = %ap.id,
                    channel = target.channel,
                    "candidate shares serving channel"
                );
                continue;
            }

            let members = self.controller.stations_on(&target);
            let model = ContentionModel::new(&self.store, &self.config.airtime);
            let attainable = match model.evaluate(ap.id, &members, sta) {
                Ok(v) => v,
                Err(e) => {
                    debug!(tick, error = %e, "skipping candidate");
                    continue;
                }
            };
            let p = satisfaction_probability(&attainable, threshold, depth);
            info!(tick, sta = %sta, candidate = %ap.id, p_attainable = p, "candidate evaluated");
            self.store.set_attainable(LinkKey::new(ap.id, sta), attainable);

            if p > best_p {
                best_p = p;
                best = Some((target, p));
            }
        }

        let Some((target, p_to)) = best else {
            info!(tick, sta = %sta, "no better access point");
            return;
        };

        if let Some(state) = self.monitored.get_mut(&sta) {
            state.phase = QosPhase::HandingOver;
        }
        match self.controller.reassociate(sta, &target) {
            Ok(()) => {
                info!(
                    tick,
                    sta = %sta,
                    from = %serving.ap,
                    to = %target.ap,
                    channel = target.channel,
                    p_good,
                    p_to,
                    "handover"
                );
                self.store.clear_delivery(link);
                if let Some(state) = self.monitored.get_mut(&sta) {
                    state.samples = 0;
                    state.p_good = None;
                    state.serving = Some(target);
                    state.phase = QosPhase::Warming;
                }
                events.push(EngineEvent::HandoverTriggered {
                    sta,
                    from: serving.ap,
                    to: target,
                    p_from: p_good,
                    p_to,
                });
            }
            Err(e) => {
                warn!(tick, sta = %sta, to = %target.ap, error = %e, "re-association failed");
                if let Some(state) = self.monitored.get_mut(&sta) {
                    state.phase = QosPhase::Evaluating;
                }
                events.push(EngineEvent::HandoverFailed {
                    sta,
                    to: target,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Radio block on `ap` that would serve a handed-over station.
    ///
    /// At most one block per access point may carry associations. With none
    /// carrying any, prefer a block in the serving band on another channel.
    fn target_block(
        &self,
        ap: &AccessPoint,
        serving: &RadioBlock,
    ) -> Result<RadioBlock, EstimateError> {
        let carrying: Vec<&RadioBlock> = ap
            .blocks
            .iter()
            .filter(|b| !self.controller.stations_on(b).is_empty())
            .collect();
        match carrying.as_slice() {
            [one] => Ok(**one),
            [] => ap
                .blocks
                .iter()
                .find(|b| b.band == serving.band && b.channel != serving.channel)
                .or_else(|| ap.blocks.iter().find(|b| b.channel != serving.channel))
                .or_else(|| ap.blocks.first())
                .copied()
                .ok_or(EstimateError::PreconditionViolated {
                    ap: ap.id,
                    reason: "access point exposes no radio blocks",
                }),
            _ => Err(EstimateError::PreconditionViolated {
                ap: ap.id,
                reason: "more than one radio block carries stations",
            }),
        }
    }

    // ─── Snapshot ───────────────────────────────────────────────────

    pub fn snapshot(&self) -> EngineSnapshot {
        let keys: BTreeSet<LinkKey> = self
            .store
            .signal_links()
            .map(|(k, _)| *k)
            .chain(self.store.delivery_links().map(|(k, _)| *k))
            .chain(self.store.attainable_links().copied())
            .collect();

        let links = keys
            .into_iter()
            .map(|key| {
                let mut link = LinkSnapshot::empty(key);
                if let Some(s) = self.store.signal(key).and_then(|w| w.latest()) {
                    link.rssi_dbm = Some(s.rssi_dbm);
                    link.phy_rate_kbps = s.phy_rate_kbps;
                }
                if let Some(w) = self.store.delivery(key) {
                    link.samples = w.len();
                    if let Some(d) = w.latest() {
                        link.pdr = Some(d.pdr);
                        link.throughput_kbps = Some(d.throughput_kbps);
                        link.selected_rate = d.selected_rate;
                    }
                }
                link.attainable_kbps = self.store.attainable(key).map(<[f64]>::to_vec);
                link
            })
            .collect();

        let access_points = self
            .store
            .access_points()
            .filter_map(|ap| {
                self.store.aggregate(ap).map(|agg| {
                    let (attempts, successes) = agg.committed();
                    ApSnapshot {
                        ap,
                        aggr_pdr: agg.committed_pdr(),
                        attempts,
                        successes,
                    }
                })
            })
            .collect();

        let monitored = self
            .monitored
            .iter()
            .map(|(sta, m)| MonitoredSnapshot {
                sta: *sta,
                phase: m.phase,
                serving_ap: m.serving.map(|b| b.ap),
                samples: m.samples,
                p_good: m.p_good,
            })
            .collect();

        EngineSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            tick: self.tick,
            links,
            access_points,
            monitored,
        }
    }
}
