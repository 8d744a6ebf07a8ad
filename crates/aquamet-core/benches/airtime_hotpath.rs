//! Per-tick estimation cost benchmarks for aquamet-core.
//!
//! Measures:
//! - window_attainable() for association sets of growing size
//! - ContentionModel::evaluate() over a full 20-slot history
//! - A complete engine tick with one monitored station and three candidates
//!
//! Run with: cargo bench --package aquamet-core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::collections::BTreeMap;
use std::sync::Mutex;

use aquamet_core::airtime::{ContentionModel, StationLoad, window_attainable};
use aquamet_core::config::AirtimeConfig;
use aquamet_core::traffic::{CounterSnapshot, RateCounters, RateHistogram};
use aquamet_core::window::{SampleStore, SignalSample, TrafficSample};
use aquamet_core::{
    AccessPoint, Band, Controller, ControllerError, EngineConfig, HandoverEngine, LinkKey, NodeId,
    RadioBlock, Telemetry,
};

fn mac(n: u8) -> NodeId {
    NodeId::new([0x02, 0, 0, 0, 0, n])
}

fn bench_window_attainable(c: &mut Criterion) {
    let airtime = AirtimeConfig::default();
    let mut group = c.benchmark_group("window_attainable");
    for n in [1usize, 8, 32] {
        let stations: Vec<StationLoad> = (0..n)
            .map(|i| StationLoad {
                arrival_pps: 200.0 + i as f64,
                frame_len_bytes: 1200.0,
                phy_rate_kbps: Some(54_000),
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &stations, |b, set| {
            b.iter(|| black_box(window_attainable(&set[0], set, 0.9, &airtime)));
        });
    }
    group.finish();
}

fn bench_contention_evaluate(c: &mut Criterion) {
    let airtime = AirtimeConfig::default();
    let ap = mac(1);
    let mut store = SampleStore::new(20);
    store.add_access_point(ap);
    let members: Vec<NodeId> = (10..18).map(mac).collect();
    for sta in members.iter().copied().chain(std::iter::once(mac(30))) {
        for _ in 0..20 {
            store.push_traffic(
                sta,
                TrafficSample {
                    arrival_pps: 300.0,
                    frame_len_bytes: 1000.0,
                },
            );
            store.push_signal(
                LinkKey::new(ap, sta),
                SignalSample {
                    rssi_dbm: -65.0,
                    phy_rate_kbps: Some(54_000),
                },
            );
        }
    }

    c.bench_function("contention_evaluate_8_members", |b| {
        let model = ContentionModel::new(&store, &airtime);
        b.iter(|| black_box(model.evaluate(ap, &members, mac(30)).unwrap()));
    });
}

struct StaticNetwork {
    aps: Vec<AccessPoint>,
    assoc: Mutex<BTreeMap<NodeId, RadioBlock>>,
}

impl Controller for StaticNetwork {
    fn access_points(&self) -> Vec<AccessPoint> {
        self.aps.clone()
    }
    fn stations_on(&self, block: &RadioBlock) -> Vec<NodeId> {
        let assoc = self.assoc.lock().unwrap();
        assoc.iter().filter(|(_, b)| *b == block).map(|(s, _)| *s).collect()
    }
    fn serving_block(&self, sta: NodeId) -> Option<RadioBlock> {
        self.assoc.lock().unwrap().get(&sta).copied()
    }
    fn reassociate(&self, _sta: NodeId, _target: &RadioBlock) -> Result<(), ControllerError> {
        Err(ControllerError::Rejected("benchmark".into()))
    }
}

fn bench_engine_tick(c: &mut Criterion) {
    let sta = mac(10);
    let aps: Vec<AccessPoint> = (1..=4)
        .map(|n| AccessPoint {
            id: mac(n),
            connected: true,
            blocks: vec![RadioBlock {
                ap: mac(n),
                channel: n * 5,
                band: Band::Ghz2_4,
            }],
        })
        .collect();
    let mut assoc = BTreeMap::new();
    assoc.insert(sta, aps[0].blocks[0]);
    let network = StaticNetwork {
        aps: aps.clone(),
        assoc: Mutex::new(assoc),
    };
    let config = EngineConfig {
        monitored: vec![sta],
        ..EngineConfig::default()
    };
    let mut engine = HandoverEngine::new(config, network);
    for ap in &aps {
        engine.ingest(Telemetry::AccessPointUp(ap.id));
    }
    engine.ingest(Telemetry::StationJoin(sta));
    engine.tick();

    // Warm the station up with poor delivery so every tick searches.
    let (mut packets, mut attempts) = (0u64, 0u64);
    for _ in 0..20 {
        for ap in &aps {
            engine.ingest(Telemetry::Signal {
                ap: ap.id,
                sta,
                rssi_dbm: -62.0,
            });
        }
        packets += 250;
        attempts += 100;
        engine.ingest(Telemetry::Counters {
            sta,
            snapshot: CounterSnapshot {
                tx_bytes: vec![packets * 1000],
                tx_packets: vec![packets],
            },
        });
        let mut histogram = RateHistogram::new();
        histogram.insert(
            7,
            RateCounters {
                attempts,
                successes: attempts / 2,
                acked_bytes: attempts * 10,
            },
        );
        engine.ingest(Telemetry::RateHistogram { sta, histogram });
        engine.tick();
    }

    c.bench_function("engine_tick_1_monitored_3_candidates", |b| {
        b.iter(|| black_box(engine.tick()));
    });
}

criterion_group!(
    benches,
    bench_window_attainable,
    bench_contention_evaluate,
    bench_engine_tick,
);
criterion_main!(benches);
