//! # Attainable-Throughput Model
//!
//! CSMA/CA airtime contention model. For a hypothetical association set on
//! one access point it estimates, per historical window, the throughput a
//! probed station would attain alongside every other active station.
//!
//! Per window `w`:
//!
//! ```text
//! access_i   = DIFS + (L_i + H)·8000 / R_i + SIFS + preamble + ack(R_i)     [µs]
//! denom      = Σ_active λ_i·L_i / access_i
//! unsat      = λ·L·pdr_ap·8 / 1000
//! sat        = λ·L·pdr_ap·8000 / denom
//! attainable = min(unsat, sat)   (unsat when denom == 0)
//! ```

use crate::config::AirtimeConfig;
use crate::error::EstimateError;
use crate::types::{LinkKey, NodeId};
use crate::window::SampleStore;

/// Offered load and link rate of one station in one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationLoad {
    pub arrival_pps: f64,
    pub frame_len_bytes: f64,
    /// `None` when the access point cannot reach the station at any rate.
    pub phy_rate_kbps: Option<u32>,
}

impl StationLoad {
    pub fn is_active(&self) -> bool {
        self.arrival_pps > 0.0
    }

    fn offered_bytes_per_sec(&self) -> f64 {
        self.arrival_pps * self.frame_len_bytes
    }
}

/// Time to receive an ACK following a data frame sent at `data_rate_kbps`.
pub fn ack_time_us(data_rate_kbps: u32, airtime: &AirtimeConfig) -> f64 {
    let ack_rate = if data_rate_kbps >= airtime.ack_rate_threshold_kbps {
        airtime.ack_high_rate_kbps
    } else {
        airtime.ack_fallback_rate_kbps
    };
    (airtime.ack_bytes as f64 * 8.0 * 1000.0) / ack_rate.max(1) as f64 + airtime.preamble_us
}

/// Channel access time for one frame of `frame_len_bytes` at `phy_rate_kbps`,
/// including inter-frame spacing, MAC header, preamble and ACK.
pub fn access_time_us(frame_len_bytes: f64, phy_rate_kbps: u32, airtime: &AirtimeConfig) -> f64 {
    let rate = phy_rate_kbps.max(1) as f64;
    airtime.difs_us
        + frame_len_bytes * 8.0 * 1000.0 / rate
        + airtime.sifs_us
        + airtime.mac_header_bytes as f64 * 8.0 * 1000.0 / rate
        + airtime.preamble_us
        + ack_time_us(phy_rate_kbps, airtime)
}

/// Σ λ·L / access_time over active stations that have a usable rate.
pub fn channel_denominator(stations: &[StationLoad], airtime: &AirtimeConfig) -> f64 {
    stations
        .iter()
        .filter(|s| s.is_active())
        .filter_map(|s| {
            let rate = s.phy_rate_kbps.filter(|r| *r > 0)?;
            Some(s.offered_bytes_per_sec() / access_time_us(s.frame_len_bytes, rate, airtime))
        })
        .sum()
}

/// Load the probed station would offer on an uncontended channel (kbps).
pub fn unsaturated_kbps(probe: &StationLoad, aggr_pdr: f64) -> f64 {
    probe.offered_bytes_per_sec() * aggr_pdr * 8.0 / 1000.0
}

/// Attainable throughput (kbps) of `probe` in one window. `stations` is the
/// whole association set for that window, probe included.
pub fn window_attainable(
    probe: &StationLoad,
    stations: &[StationLoad],
    aggr_pdr: f64,
    airtime: &AirtimeConfig,
) -> f64 {
    if probe.phy_rate_kbps.is_none_or(|r| r == 0) {
        return 0.0;
    }
    let unsat = unsaturated_kbps(probe, aggr_pdr);
    let denominator = channel_denominator(stations, airtime);
    if denominator > 0.0 {
        let sat = probe.offered_bytes_per_sec() * aggr_pdr * 8000.0 / denominator;
        unsat.min(sat)
    } else {
        unsat
    }
}

/// Fraction of `depth` samples at or above `threshold_kbps`.
pub fn satisfaction_probability<'a>(
    samples: impl IntoIterator<Item = &'a f64>,
    threshold_kbps: f64,
    depth: usize,
) -> f64 {
    if depth == 0 {
        return 0.0;
    }
    let good = samples
        .into_iter()
        .take(depth)
        .filter(|v| **v >= threshold_kbps)
        .count();
    good as f64 / depth as f64
}

/// Evaluates association sets against the sample store.
pub struct ContentionModel<'a> {
    store: &'a SampleStore,
    airtime: &'a AirtimeConfig,
}

impl<'a> ContentionModel<'a> {
    pub fn new(store: &'a SampleStore, airtime: &'a AirtimeConfig) -> Self {
        ContentionModel { store, airtime }
    }

    /// Load of `sta` toward `ap` in window `w`. Stations without a traffic
    /// sample at `w` are idle. The PHY rate falls back to the newest signal
    /// report when none lines up with `w`.
    fn load(&self, ap: NodeId, sta: NodeId, w: usize) -> StationLoad {
        let traffic = self
            .store
            .traffic(sta)
            .and_then(|t| t.get(w))
            .copied()
            .unwrap_or_default();
        let phy_rate_kbps = self
            .store
            .signal(LinkKey::new(ap, sta))
            .and_then(|s| s.get(w).or_else(|| s.latest()))
            .and_then(|s| s.phy_rate_kbps);
        StationLoad {
            arrival_pps: traffic.arrival_pps,
            frame_len_bytes: traffic.frame_len_bytes,
            phy_rate_kbps,
        }
    }

    /// Attainable throughput of `probe` for every window, newest first, if it
    /// joined `members` on `ap`.
    pub fn evaluate(
        &self,
        ap: NodeId,
        members: &[NodeId],
        probe: NodeId,
    ) -> Result<Vec<f64>, EstimateError> {
        let depth = self.store.depth();
        let have = self.store.traffic(probe).map(|t| t.len()).unwrap_or(0);
        if have < depth {
            return Err(EstimateError::InsufficientHistory {
                link: LinkKey::new(ap, probe),
                have,
                need: depth,
            });
        }
        let aggregate = self
            .store
            .aggregate(ap)
            .ok_or(EstimateError::MissingTopology {
                kind: "access point",
                node: ap,
            })?;

        let mut set: Vec<NodeId> = members.to_vec();
        if !set.contains(&probe) {
            set.push(probe);
        }

        let mut out = Vec::with_capacity(depth);
        let mut loads = Vec::with_capacity(set.len());
        for w in 0..depth {
            loads.clear();
            loads.extend(set.iter().map(|sta| self.load(ap, *sta, w)));
            let probe_load = self.load(ap, probe, w);
            out.push(window_attainable(
                &probe_load,
                &loads,
                aggregate.pdr(w),
                self.airtime,
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{SignalSample, TrafficSample};
    use proptest::prelude::*;

    fn node(n: u8) -> NodeId {
        NodeId::new([2, 0, 0, 0, 0, n])
    }

    fn load(pps: f64, len: f64, rate: Option<u32>) -> StationLoad {
        StationLoad {
            arrival_pps: pps,
            frame_len_bytes: len,
            phy_rate_kbps: rate,
        }
    }

    #[test]
    fn ack_rate_depends_on_data_rate() {
        let t = AirtimeConfig::default();
        // 14 B @ 24 Mbps = 4.667 µs, @ 2 Mbps = 56 µs, plus 20 µs preamble.
        assert!((ack_time_us(54_000, &t) - (112_000.0 / 24_000.0 + 20.0)).abs() < 1e-9);
        assert!((ack_time_us(24_000, &t) - (112_000.0 / 24_000.0 + 20.0)).abs() < 1e-9);
        assert!((ack_time_us(18_000, &t) - 76.0).abs() < 1e-9);
    }

    #[test]
    fn access_time_includes_all_overheads() {
        let t = AirtimeConfig::default();
        let at = access_time_us(1000.0, 54_000, &t);
        let expected = 34.0
            + 8_000_000.0 / 54_000.0
            + 16.0
            + 272_000.0 / 54_000.0
            + 20.0
            + ack_time_us(54_000, &t);
        assert!((at - expected).abs() < 1e-9);
        assert!(access_time_us(1000.0, 6_000, &t) > at);
    }

    #[test]
    fn idle_channel_is_unconstrained() {
        let t = AirtimeConfig::default();
        let probe = load(0.0, 0.0, Some(54_000));
        assert_eq!(window_attainable(&probe, &[probe], 1.0, &t), 0.0);
        assert_eq!(channel_denominator(&[probe], &t), 0.0);
    }

    #[test]
    fn unreachable_probe_attains_nothing() {
        let t = AirtimeConfig::default();
        let probe = load(100.0, 1000.0, None);
        assert_eq!(window_attainable(&probe, &[probe], 1.0, &t), 0.0);
    }

    #[test]
    fn contention_lowers_the_saturated_share() {
        let t = AirtimeConfig::default();
        let probe = load(1000.0, 1500.0, Some(6_000));
        let alone = window_attainable(&probe, &[probe], 1.0, &t);
        // The saturated share only binds once Σ λ·L / access_time exceeds
        // 1e6, so the contenders here are very small frames at a huge rate.
        let crowd: Vec<_> = std::iter::once(probe)
            .chain((0..2).map(|_| load(1_000_000.0, 100.0, Some(1_000_000))))
            .collect();
        let crowded = window_attainable(&probe, &crowd, 1.0, &t);
        assert!(crowded < alone);
        assert!((alone - unsaturated_kbps(&probe, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn satisfaction_probability_counts_against_depth() {
        let samples = [5.0, 10.0, 0.0, 20.0];
        assert_eq!(satisfaction_probability(&samples, 10.0, 4), 0.5);
        // Short history still divides by the full depth.
        assert_eq!(satisfaction_probability(&samples[..2], 10.0, 4), 0.25);
        assert_eq!(satisfaction_probability(&samples, 10.0, 0), 0.0);
    }

    #[test]
    fn evaluate_requires_full_probe_history() {
        let mut store = SampleStore::new(3);
        let ap = node(1);
        store.add_access_point(ap);
        store.push_traffic(node(2), TrafficSample::default());
        let t = AirtimeConfig::default();
        let err = ContentionModel::new(&store, &t)
            .evaluate(ap, &[], node(2))
            .unwrap_err();
        assert!(matches!(err, EstimateError::InsufficientHistory { have: 1, need: 3, .. }));
    }

    #[test]
    fn evaluate_requires_known_ap() {
        let mut store = SampleStore::new(1);
        store.push_traffic(node(2), TrafficSample::default());
        let t = AirtimeConfig::default();
        let err = ContentionModel::new(&store, &t)
            .evaluate(node(1), &[], node(2))
            .unwrap_err();
        assert!(matches!(err, EstimateError::MissingTopology { .. }));
    }

    #[test]
    fn evaluate_produces_one_value_per_window() {
        let mut store = SampleStore::new(4);
        let (ap, probe, other) = (node(1), node(2), node(3));
        store.add_access_point(ap);
        for _ in 0..4 {
            store.push_traffic(
                probe,
                TrafficSample {
                    arrival_pps: 100.0,
                    frame_len_bytes: 1000.0,
                },
            );
            store.push_traffic(
                other,
                TrafficSample {
                    arrival_pps: 500.0,
                    frame_len_bytes: 1500.0,
                },
            );
        }
        for sta in [probe, other] {
            store.push_signal(
                LinkKey::new(ap, sta),
                SignalSample {
                    rssi_dbm: -60.0,
                    phy_rate_kbps: Some(54_000),
                },
            );
        }
        let t = AirtimeConfig::default();
        let out = ContentionModel::new(&store, &t)
            .evaluate(ap, &[other], probe)
            .unwrap();
        assert_eq!(out.len(), 4);
        let unsat = 100.0 * 1000.0 * 8.0 / 1000.0;
        for v in out {
            assert!(v > 0.0 && v <= unsat + 1e-9);
        }
    }

    proptest! {
        #[test]
        fn attainable_never_exceeds_unsaturated(
            pps in 0.0f64..5000.0,
            len in 0.0f64..2000.0,
            pdr in 0.0f64..=1.0,
            others in proptest::collection::vec((0.0f64..5000.0, 0.0f64..2000.0, 1u32..150_000), 0..8),
        ) {
            let t = AirtimeConfig::default();
            let probe = load(pps, len, Some(54_000));
            let mut set = vec![probe];
            set.extend(others.into_iter().map(|(p, l, r)| load(p, l, Some(r))));
            let att = window_attainable(&probe, &set, pdr, &t);
            prop_assert!(att <= unsaturated_kbps(&probe, pdr) + 1e-9);
            prop_assert!(att >= 0.0);
        }
    }
}
