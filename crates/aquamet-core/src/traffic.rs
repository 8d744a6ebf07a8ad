//! # Traffic & Delivery Aggregator
//!
//! Turns monotonically increasing hardware counters into per-window rates.
//! The previous snapshot is kept per station; the very first snapshot for a
//! station is treated as a delta against zero.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EstimateError;
use crate::types::NodeId;
use crate::window::{DeliverySample, TrafficSample};

/// Cumulative transmit counters, bucketed by frame-size bin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub tx_bytes: Vec<u64>,
    pub tx_packets: Vec<u64>,
}

impl CounterSnapshot {
    pub fn totals(&self) -> (u64, u64) {
        (
            self.tx_bytes.iter().fold(0u64, |a, b| a.saturating_add(*b)),
            self.tx_packets.iter().fold(0u64, |a, b| a.saturating_add(*b)),
        )
    }
}

/// Cumulative rate-adaptation counters for one rate index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCounters {
    pub attempts: u64,
    pub successes: u64,
    pub acked_bytes: u64,
}

/// Rate index → cumulative counters.
pub type RateHistogram = BTreeMap<u32, RateCounters>;

fn histogram_totals(hist: &RateHistogram) -> RateCounters {
    hist.values().fold(RateCounters::default(), |acc, c| RateCounters {
        attempts: acc.attempts.saturating_add(c.attempts),
        successes: acc.successes.saturating_add(c.successes),
        acked_bytes: acc.acked_bytes.saturating_add(c.acked_bytes),
    })
}

fn delta(node: NodeId, counter: &'static str, now: u64, prev: u64) -> Result<u64, EstimateError> {
    now.checked_sub(prev)
        .ok_or(EstimateError::CounterRegression {
            node,
            counter,
            prev,
            now,
        })
}

/// Result of one histogram ingestion: the link sample plus the raw deltas
/// to fold into the access point's current aggregate slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryUpdate {
    pub sample: DeliverySample,
    pub attempts: u64,
    pub successes: u64,
}

/// Rate index whose attempt count grew the most since `prev`. Ties resolve
/// to the lowest index; `None` if nothing was attempted.
pub fn selected_rate(now: &RateHistogram, prev: Option<&RateHistogram>) -> Option<u32> {
    let mut best: Option<(u32, u64)> = None;
    for (&rate, counters) in now {
        let before = prev
            .and_then(|p| p.get(&rate))
            .map(|c| c.attempts)
            .unwrap_or(0);
        let grown = counters.attempts.saturating_sub(before);
        if grown > best.map(|(_, n)| n).unwrap_or(0) {
            best = Some((rate, grown));
        }
    }
    best.map(|(rate, _)| rate)
}

/// Per-station cold-start state for counter delta accounting.
#[derive(Debug, Clone)]
pub struct TrafficAggregator {
    window_ms: f64,
    last_counters: HashMap<NodeId, (u64, u64)>,
    last_histogram: HashMap<NodeId, RateHistogram>,
}

impl TrafficAggregator {
    pub fn new(window: Duration) -> Self {
        TrafficAggregator {
            window_ms: (window.as_secs_f64() * 1000.0).max(1.0),
            last_counters: HashMap::new(),
            last_histogram: HashMap::new(),
        }
    }

    /// Arrival rate and mean frame length from a counter snapshot.
    ///
    /// On a counter regression the new snapshot still becomes the baseline
    /// so the next window is measured against it.
    pub fn on_counters(
        &mut self,
        sta: NodeId,
        snapshot: &CounterSnapshot,
    ) -> Result<TrafficSample, EstimateError> {
        let (bytes, packets) = snapshot.totals();
        let (prev_bytes, prev_packets) = self
            .last_counters
            .insert(sta, (bytes, packets))
            .unwrap_or((0, 0));

        let d_bytes = delta(sta, "tx_bytes", bytes, prev_bytes)?;
        let d_packets = delta(sta, "tx_packets", packets, prev_packets)?;

        let arrival_pps = d_packets as f64 * 1000.0 / self.window_ms;
        let frame_len_bytes = if d_packets > 0 {
            d_bytes as f64 / d_packets as f64
        } else {
            0.0
        };
        Ok(TrafficSample {
            arrival_pps,
            frame_len_bytes,
        })
    }

    /// Link PDR, measured throughput and selected rate from a histogram.
    pub fn on_histogram(
        &mut self,
        sta: NodeId,
        hist: &RateHistogram,
    ) -> Result<DeliveryUpdate, EstimateError> {
        let prev = self.last_histogram.insert(sta, hist.clone());
        let now = histogram_totals(hist);
        let before = prev.as_ref().map(histogram_totals).unwrap_or_default();

        let d_att = delta(sta, "attempts", now.attempts, before.attempts)?;
        let d_succ = delta(sta, "successes", now.successes, before.successes)?;
        let d_acked = delta(sta, "acked_bytes", now.acked_bytes, before.acked_bytes)?;

        // A link that did not transmit this window reports zero delivery.
        let pdr = if d_att > 0 {
            (d_succ as f64 / d_att as f64).min(1.0)
        } else {
            0.0
        };
        let throughput_kbps = d_acked as f64 * 8.0 / self.window_ms;

        Ok(DeliveryUpdate {
            sample: DeliverySample {
                pdr,
                throughput_kbps,
                selected_rate: selected_rate(hist, prev.as_ref()),
            },
            attempts: d_att,
            successes: d_succ,
        })
    }

    pub fn forget(&mut self, sta: NodeId) {
        self.last_counters.remove(&sta);
        self.last_histogram.remove(&sta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sta() -> NodeId {
        NodeId::new([0xa4, 0x34, 0xd9, 0xbf, 0x50, 0xef])
    }

    fn agg() -> TrafficAggregator {
        TrafficAggregator::new(Duration::from_millis(500))
    }

    fn counters(bytes: &[u64], packets: &[u64]) -> CounterSnapshot {
        CounterSnapshot {
            tx_bytes: bytes.to_vec(),
            tx_packets: packets.to_vec(),
        }
    }

    fn hist(entries: &[(u32, u64, u64, u64)]) -> RateHistogram {
        entries
            .iter()
            .map(|&(rate, attempts, successes, acked_bytes)| {
                (
                    rate,
                    RateCounters {
                        attempts,
                        successes,
                        acked_bytes,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn first_snapshot_bootstraps_from_absolute_counters() {
        let mut a = agg();
        let s = a
            .on_counters(sta(), &counters(&[30_000, 70_000], &[50, 50]))
            .unwrap();
        assert!((s.arrival_pps - 200.0).abs() < 1e-9);
        assert!((s.frame_len_bytes - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn deltas_against_previous_snapshot() {
        let mut a = agg();
        a.on_counters(sta(), &counters(&[100_000], &[100])).unwrap();
        let s = a.on_counters(sta(), &counters(&[160_000], &[150])).unwrap();
        assert!((s.arrival_pps - 100.0).abs() < 1e-9);
        assert!((s.frame_len_bytes - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn identical_snapshots_yield_zero_rates() {
        let mut a = agg();
        let snap = counters(&[5_000], &[10]);
        a.on_counters(sta(), &snap).unwrap();
        let s = a.on_counters(sta(), &snap).unwrap();
        assert_eq!(s.arrival_pps, 0.0);
        assert_eq!(s.frame_len_bytes, 0.0);

        let h = hist(&[(12, 10, 9, 9000)]);
        a.on_histogram(sta(), &h).unwrap();
        let d = a.on_histogram(sta(), &h).unwrap();
        assert_eq!(d.attempts, 0);
        assert_eq!(d.sample.pdr, 0.0);
        assert_eq!(d.sample.throughput_kbps, 0.0);
        assert_eq!(d.sample.selected_rate, None);
    }

    #[test]
    fn counter_regression_is_reported_and_rebaselined() {
        let mut a = agg();
        a.on_counters(sta(), &counters(&[10_000], &[10])).unwrap();
        let err = a.on_counters(sta(), &counters(&[1_000], &[1])).unwrap_err();
        assert!(matches!(err, EstimateError::CounterRegression { .. }));
        let s = a.on_counters(sta(), &counters(&[2_000], &[2])).unwrap();
        assert!((s.arrival_pps - 2.0).abs() < 1e-9);
    }

    #[test]
    fn histogram_pdr_and_throughput() {
        let mut a = agg();
        a.on_histogram(sta(), &hist(&[(12, 100, 90, 90_000)])).unwrap();
        let d = a
            .on_histogram(sta(), &hist(&[(12, 150, 130, 140_000), (24, 50, 50, 62_500)]))
            .unwrap();
        assert_eq!(d.attempts, 100);
        assert_eq!(d.successes, 90);
        assert!((d.sample.pdr - 0.9).abs() < 1e-12);
        // 112_500 bytes * 8 / 500 ms
        assert!((d.sample.throughput_kbps - 1800.0).abs() < 1e-9);
    }

    #[test]
    fn selected_rate_uses_per_station_previous_snapshot() {
        let prev = hist(&[(12, 1000, 900, 0), (24, 10, 10, 0)]);
        let now = hist(&[(12, 1010, 910, 0), (24, 60, 60, 0)]);
        assert_eq!(selected_rate(&now, Some(&prev)), Some(24));
        assert_eq!(selected_rate(&now, None), Some(12));
    }

    #[test]
    fn selected_rate_ties_pick_lowest_index() {
        let now = hist(&[(36, 40, 40, 0), (12, 40, 40, 0), (24, 10, 10, 0)]);
        assert_eq!(selected_rate(&now, None), Some(12));
    }

    #[test]
    fn idle_link_reports_zero_pdr() {
        let mut a = agg();
        let d = a.on_histogram(sta(), &RateHistogram::new()).unwrap();
        assert_eq!(d.sample.pdr, 0.0);
    }

    #[test]
    fn forget_resets_cold_start() {
        let mut a = agg();
        a.on_counters(sta(), &counters(&[10_000], &[10])).unwrap();
        a.forget(sta());
        let s = a.on_counters(sta(), &counters(&[10_000], &[10])).unwrap();
        assert!((s.arrival_pps - 20.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn monotonic_counters_give_non_negative_rates(
            b0 in 0u64..1_000_000_000,
            p0 in 0u64..1_000_000,
            db in 0u64..1_000_000_000,
            dp in 0u64..1_000_000,
        ) {
            let mut a = agg();
            a.on_counters(sta(), &counters(&[b0], &[p0])).unwrap();
            let s = a.on_counters(sta(), &counters(&[b0 + db], &[p0 + dp])).unwrap();
            prop_assert!(s.arrival_pps >= 0.0);
            prop_assert!(s.frame_len_bytes >= 0.0);
        }
    }
}
