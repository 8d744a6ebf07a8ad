use std::collections::BTreeMap;
use std::time::Duration;

use aquamet_core::rate::{PhyStandard, estimated_mcs};
use aquamet_core::traffic::{CounterSnapshot, RateHistogram};
use aquamet_core::{AccessPoint, Band, Controller, NodeId, RadioBlock, Telemetry};
use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::network::{Position, SimNetwork};

/// Log-distance path loss parameters.
#[derive(Debug, Clone)]
pub struct RadioModel {
    pub tx_power_dbm: f64,
    /// Loss at the 1 m reference distance.
    pub reference_loss_db: f64,
    pub path_loss_exponent: f64,
    /// Uniform shadowing, ± this many dB per sample.
    pub shadowing_db: f64,
    pub noise_floor_dbm: f64,
    pub phy_standard: PhyStandard,
}

impl Default for RadioModel {
    fn default() -> Self {
        Self {
            tx_power_dbm: 15.0,
            reference_loss_db: 40.0,
            path_loss_exponent: 3.5,
            shadowing_db: 2.0,
            noise_floor_dbm: -95.0,
            phy_standard: PhyStandard::G20,
        }
    }
}

impl RadioModel {
    pub fn mean_rssi_dbm(&self, distance_m: f64) -> f64 {
        self.tx_power_dbm
            - self.reference_loss_db
            - 10.0 * self.path_loss_exponent * distance_m.max(1.0).log10()
    }

    /// Frame delivery probability at `snr_db`: nothing below 8 dB, everything
    /// above 23 dB, linear in between.
    pub fn delivery_probability(&self, snr_db: f64) -> f64 {
        ((snr_db - 8.0) / 15.0).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct ApSpec {
    pub id: NodeId,
    pub at: Position,
    pub connected: bool,
    pub blocks: Vec<(u8, Band)>,
}

#[derive(Debug, Clone)]
pub struct StationSpec {
    pub id: NodeId,
    pub start: Position,
    /// Metres moved per tick.
    pub velocity: (f64, f64),
    pub offered_pps: f64,
    pub frame_len_bytes: u64,
    /// Access point and channel the station starts on.
    pub serving: Option<(NodeId, u8)>,
    pub monitored: bool,
}

/// Configuration for a deterministic mobility scenario.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub tick: Duration,
    pub radio: RadioModel,
    pub access_points: Vec<ApSpec>,
    pub stations: Vec<StationSpec>,
}

fn node(last: u8) -> NodeId {
    NodeId::new([0x02, 0xaa, 0, 0, 0, last])
}

impl ScenarioConfig {
    /// Two access points 60 m apart on channels 1 and 6. A monitored station
    /// walks from the first toward the second while a static station keeps
    /// loading the first.
    pub fn walkaway(seed: u64) -> Self {
        let (ap1, ap2) = (node(1), node(2));
        Self {
            seed,
            tick: Duration::from_millis(500),
            radio: RadioModel::default(),
            access_points: vec![
                ApSpec {
                    id: ap1,
                    at: Position { x: 0.0, y: 0.0 },
                    connected: true,
                    blocks: vec![(1, Band::Ghz2_4)],
                },
                ApSpec {
                    id: ap2,
                    at: Position { x: 60.0, y: 0.0 },
                    connected: true,
                    blocks: vec![(6, Band::Ghz2_4), (36, Band::Ghz5)],
                },
            ],
            stations: vec![
                StationSpec {
                    id: node(10),
                    start: Position { x: 5.0, y: 0.0 },
                    velocity: (1.0, 0.0),
                    offered_pps: 250.0,
                    frame_len_bytes: 1000,
                    serving: Some((ap1, 1)),
                    monitored: true,
                },
                StationSpec {
                    id: node(11),
                    start: Position { x: 3.0, y: 4.0 },
                    velocity: (0.0, 0.0),
                    offered_pps: 100.0,
                    frame_len_bytes: 600,
                    serving: Some((ap1, 1)),
                    monitored: false,
                },
            ],
        }
    }

    pub fn monitored(&self) -> Vec<NodeId> {
        self.stations
            .iter()
            .filter(|s| s.monitored)
            .map(|s| s.id)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct StationState {
    at: Position,
    packets: u64,
    bytes: u64,
    histogram: RateHistogram,
}

/// Deterministic telemetry generator.
///
/// Given a seed, every call to [`Scenario::step`] moves the stations and
/// emits one window of signal, counter and rate-histogram telemetry, as a
/// controller would report it.
#[derive(Debug)]
pub struct Scenario {
    cfg: ScenarioConfig,
    rng: StdRng,
    network: SimNetwork,
    states: Vec<StationState>,
    step: u64,
}

impl Scenario {
    /// Builds the topology on `network` and returns the generator.
    pub fn new(cfg: ScenarioConfig, network: SimNetwork) -> Self {
        for ap in &cfg.access_points {
            network.add_access_point(
                AccessPoint {
                    id: ap.id,
                    connected: ap.connected,
                    blocks: ap
                        .blocks
                        .iter()
                        .map(|(channel, band)| RadioBlock {
                            ap: ap.id,
                            channel: *channel,
                            band: *band,
                        })
                        .collect(),
                },
                ap.at,
            );
        }
        for sta in &cfg.stations {
            let block = sta.serving.and_then(|(ap, channel)| {
                cfg.access_points
                    .iter()
                    .find(|a| a.id == ap)
                    .and_then(|a| a.blocks.iter().find(|(c, _)| *c == channel))
                    .map(|(channel, band)| RadioBlock {
                        ap,
                        channel: *channel,
                        band: *band,
                    })
            });
            if let Some(block) = block {
                network.associate(sta.id, block);
            }
        }

        let states = cfg
            .stations
            .iter()
            .map(|s| StationState {
                at: s.start,
                packets: 0,
                bytes: 0,
                histogram: RateHistogram::new(),
            })
            .collect();

        Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            cfg,
            network,
            states,
            step: 0,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.cfg
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Topology announcements to deliver before the first tick.
    pub fn bootstrap(&self) -> Vec<Telemetry> {
        self.cfg
            .access_points
            .iter()
            .map(|ap| Telemetry::AccessPointUp(ap.id))
            .chain(self.cfg.stations.iter().map(|s| Telemetry::StationJoin(s.id)))
            .collect()
    }

    fn rssi_dbm(&mut self, ap: NodeId, at: &Position) -> Option<f64> {
        let ap_at = self.network.position(ap)?;
        let shadow = rand_signed(&mut self.rng, self.cfg.radio.shadowing_db);
        Some(self.cfg.radio.mean_rssi_dbm(ap_at.distance(at)) + shadow)
    }

    /// Advance one tick and return the telemetry observed during it.
    pub fn step(&mut self) -> Vec<Telemetry> {
        self.step += 1;
        let window_s = self.cfg.tick.as_secs_f64();
        let mut out = Vec::new();

        for idx in 0..self.cfg.stations.len() {
            let spec = self.cfg.stations[idx].clone();
            if self.step > 1 {
                let at = &mut self.states[idx].at;
                at.x += spec.velocity.0;
                at.y += spec.velocity.1;
            }
            let at = self.states[idx].at;

            let aps: Vec<NodeId> = self.cfg.access_points.iter().map(|a| a.id).collect();
            let mut serving_rssi = None;
            let serving = self.network.serving_block(spec.id);
            for ap in aps {
                let Some(rssi_dbm) = self.rssi_dbm(ap, &at) else {
                    continue;
                };
                if serving.is_some_and(|b| b.ap == ap) {
                    serving_rssi = Some(rssi_dbm);
                }
                out.push(Telemetry::Signal {
                    ap,
                    sta: spec.id,
                    rssi_dbm,
                });
            }

            // Offered load, ±10 % per window.
            let jitter = 1.0 + rand_signed(&mut self.rng, 0.1);
            let packets = (spec.offered_pps * window_s * jitter).round().max(0.0) as u64;
            let state = &mut self.states[idx];
            state.packets += packets;
            state.bytes += packets * spec.frame_len_bytes;
            out.push(Telemetry::Counters {
                sta: spec.id,
                snapshot: CounterSnapshot {
                    tx_bytes: vec![state.bytes],
                    tx_packets: vec![state.packets],
                },
            });

            let Some(rssi_dbm) = serving_rssi else {
                continue;
            };
            let radio = &self.cfg.radio;
            let snr_db = rssi_dbm - radio.noise_floor_dbm;
            let successes = (packets as f64 * radio.delivery_probability(snr_db)).round() as u64;
            let bucket = estimated_mcs(rssi_dbm, radio.noise_floor_dbm, radio.phy_standard)
                .map(|mcs| mcs as u32)
                .unwrap_or(0);
            let counters = state.histogram.entry(bucket).or_default();
            counters.attempts += packets;
            counters.successes += successes;
            counters.acked_bytes += successes * spec.frame_len_bytes;
            out.push(Telemetry::RateHistogram {
                sta: spec.id,
                histogram: state.histogram.clone(),
            });
        }

        out
    }
}

fn rand_signed(rng: &mut StdRng, max_step: f64) -> f64 {
    if max_step <= 0.0 {
        return 0.0;
    }
    let mag = rng.random::<f64>() * max_step;
    if rng.random::<bool>() { mag } else { -mag }
}

/// Latest cumulative packet count per station in a batch of telemetry.
pub fn cumulative_packets(telemetry: &[Telemetry]) -> BTreeMap<NodeId, u64> {
    telemetry
        .iter()
        .filter_map(|t| match t {
            Telemetry::Counters { sta, snapshot } => Some((*sta, snapshot.totals().1)),
            _ => None,
        })
        .collect()
}
