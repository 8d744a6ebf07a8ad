use aquamet_core::{Controller, EngineConfig, EngineEvent, HandoverEngine, QosPhase, TickReport};
use aquamet_sim::drive;
use aquamet_sim::network::SimNetwork;
use aquamet_sim::scenario::{Scenario, ScenarioConfig};

fn run(seed: u64, ticks: u64) -> (Vec<TickReport>, HandoverEngine<SimNetwork>, SimNetwork) {
    let scenario_cfg = ScenarioConfig::walkaway(seed);
    let config = EngineConfig {
        monitored: scenario_cfg.monitored(),
        tick: scenario_cfg.tick,
        ..EngineConfig::default()
    };
    let network = SimNetwork::new();
    let mut scenario = Scenario::new(scenario_cfg, network.clone());
    let mut engine = HandoverEngine::new(config, network.clone());
    let reports = drive(&mut engine, &mut scenario, ticks);
    (reports, engine, network)
}

#[test]
fn walking_station_is_handed_to_the_nearer_ap() {
    let cfg = ScenarioConfig::walkaway(42);
    let sta = cfg.monitored()[0];
    let (ap1, ap2) = (cfg.access_points[0].id, cfg.access_points[1].id);

    let (reports, engine, network) = run(42, 60);

    let handovers: Vec<&EngineEvent> = reports.iter().flat_map(|r| r.handovers()).collect();
    assert_eq!(handovers.len(), 1, "exactly one handover: {handovers:?}");
    match handovers[0] {
        EngineEvent::HandoverTriggered {
            sta: s,
            from,
            to,
            p_from,
            p_to,
        } => {
            assert_eq!(*s, sta);
            assert_eq!(*from, ap1);
            assert_eq!(to.ap, ap2);
            assert_eq!(to.channel, 6);
            assert!(*p_from < 0.7);
            assert!(p_to > p_from);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Degradation is announced before the move.
    let first_degraded = reports
        .iter()
        .position(|r| {
            r.events
                .iter()
                .any(|e| matches!(e, EngineEvent::QosDegraded { .. }))
        })
        .unwrap();
    let handover_at = reports
        .iter()
        .position(|r| r.handovers().count() > 0)
        .unwrap();
    assert!(first_degraded <= handover_at);
    assert!(handover_at >= 19, "no decision before the window fills");

    assert_eq!(network.serving_block(sta).map(|b| b.ap), Some(ap2));
    assert_eq!(network.reassociations().len(), 1);
    assert!(matches!(
        engine.phase(sta),
        Some(QosPhase::Warming | QosPhase::Stable)
    ));

    let snap = engine.snapshot();
    assert_eq!(snap.monitored[0].serving_ap, Some(ap2));
    assert!(snap.link(aquamet_core::LinkKey::new(ap2, sta)).is_some());
}

#[test]
fn static_station_is_never_moved() {
    let cfg = ScenarioConfig::walkaway(9);
    let background = cfg.stations[1].id;
    let (_, _, network) = run(9, 60);
    assert!(
        network
            .reassociations()
            .iter()
            .all(|(sta, _)| *sta != background)
    );
}

#[test]
fn runs_are_reproducible() {
    let (a, _, _) = run(1234, 50);
    let (b, _, _) = run(1234, 50);
    assert_eq!(a, b);
}

#[test]
fn snapshot_json_is_parseable() {
    let (_, engine, _) = run(7, 10);
    let json = engine.snapshot().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["tick"], 11);
    assert_eq!(value["access_points"].as_array().unwrap().len(), 2);
}
