//! # Windowed Sample Store
//!
//! Fixed-depth ring buffers, newest sample first. Series that must co-vary
//! (arrival rate and frame length for a station; PDR, throughput and
//! selected rate for a link) are stored as one buffer of tuple samples, so
//! their lengths cannot diverge.

use std::collections::{BTreeMap, VecDeque};

use crate::types::{LinkKey, NodeId};

/// Sliding window holding at most `depth` samples, index 0 = most recent.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<T> {
    depth: usize,
    samples: VecDeque<T>,
}

impl<T> Window<T> {
    pub fn new(depth: usize) -> Self {
        Window {
            depth,
            samples: VecDeque::with_capacity(depth + 1),
        }
    }

    /// Insert at the front and discard anything past `depth - 1`.
    pub fn push(&mut self, sample: T) {
        self.samples.push_front(sample);
        self.samples.truncate(self.depth);
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.samples.get(index)
    }

    pub fn latest(&self) -> Option<&T> {
        self.samples.front()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.depth
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }
}

/// Per-station traffic sample derived from the transmit counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrafficSample {
    pub arrival_pps: f64,
    pub frame_len_bytes: f64,
}

/// Per-link signal sample. `phy_rate_kbps` is `None` when the signal is
/// too weak for any modulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSample {
    pub rssi_dbm: f64,
    pub phy_rate_kbps: Option<u32>,
}

/// Per-link delivery sample derived from the rate-adaptation histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliverySample {
    pub pdr: f64,
    pub throughput_kbps: f64,
    pub selected_rate: Option<u32>,
}

/// Per-access-point attempt/success accumulators, one slot per tick.
///
/// Slot 0 accumulates during the ingest phase and is shifted out by
/// [`ApAggregate::rotate`] at the end of each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ApAggregate {
    attempts: VecDeque<u64>,
    successes: VecDeque<u64>,
    /// Slot 0 as it stood at the last rotation.
    committed: (u64, u64),
}

impl ApAggregate {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        ApAggregate {
            attempts: VecDeque::from(vec![0; depth]),
            successes: VecDeque::from(vec![0; depth]),
            committed: (0, 0),
        }
    }

    pub fn accumulate(&mut self, attempts: u64, successes: u64) {
        if let Some(slot) = self.attempts.front_mut() {
            *slot = slot.saturating_add(attempts);
        }
        if let Some(slot) = self.successes.front_mut() {
            *slot = slot.saturating_add(successes);
        }
    }

    /// Shift right by one, dropping the oldest slot, and open a zeroed slot 0.
    pub fn rotate(&mut self) {
        self.committed = (self.attempts(0), self.successes(0));
        self.attempts.pop_back();
        self.successes.pop_back();
        self.attempts.push_front(0);
        self.successes.push_front(0);
    }

    pub fn attempts(&self, slot: usize) -> u64 {
        self.attempts.get(slot).copied().unwrap_or(0)
    }

    pub fn successes(&self, slot: usize) -> u64 {
        self.successes.get(slot).copied().unwrap_or(0)
    }

    /// Aggregate delivery ratio for a slot. An idle channel counts as
    /// lossless, so zero attempts yields 1.0.
    pub fn pdr(&self, slot: usize) -> f64 {
        delivery_ratio(self.attempts(slot), self.successes(slot))
    }

    /// Attempts and successes of the most recently completed tick. Survives
    /// rotation even at depth 1.
    pub fn committed(&self) -> (u64, u64) {
        self.committed
    }

    pub fn committed_pdr(&self) -> f64 {
        delivery_ratio(self.committed.0, self.committed.1)
    }
}

fn delivery_ratio(attempts: u64, successes: u64) -> f64 {
    if attempts == 0 {
        1.0
    } else {
        (successes as f64 / attempts as f64).min(1.0)
    }
}

/// All sliding-window state owned by one engine instance.
#[derive(Debug, Clone)]
pub struct SampleStore {
    depth: usize,
    traffic: BTreeMap<NodeId, Window<TrafficSample>>,
    signal: BTreeMap<LinkKey, Window<SignalSample>>,
    delivery: BTreeMap<LinkKey, Window<DeliverySample>>,
    attainable: BTreeMap<LinkKey, Vec<f64>>,
    aggregates: BTreeMap<NodeId, ApAggregate>,
}

impl SampleStore {
    pub fn new(depth: usize) -> Self {
        SampleStore {
            depth: depth.max(1),
            traffic: BTreeMap::new(),
            signal: BTreeMap::new(),
            delivery: BTreeMap::new(),
            attainable: BTreeMap::new(),
            aggregates: BTreeMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    pub fn add_access_point(&mut self, ap: NodeId) {
        let depth = self.depth;
        self.aggregates
            .entry(ap)
            .or_insert_with(|| ApAggregate::new(depth));
    }

    pub fn has_access_point(&self, ap: NodeId) -> bool {
        self.aggregates.contains_key(&ap)
    }

    pub fn remove_access_point(&mut self, ap: NodeId) {
        self.aggregates.remove(&ap);
        self.signal.retain(|k, _| k.ap != ap);
        self.delivery.retain(|k, _| k.ap != ap);
        self.attainable.retain(|k, _| k.ap != ap);
    }

    pub fn add_station(&mut self, sta: NodeId) {
        let depth = self.depth;
        self.traffic.entry(sta).or_insert_with(|| Window::new(depth));
    }

    pub fn has_station(&self, sta: NodeId) -> bool {
        self.traffic.contains_key(&sta)
    }

    pub fn remove_station(&mut self, sta: NodeId) {
        self.traffic.remove(&sta);
        self.signal.retain(|k, _| k.sta != sta);
        self.delivery.retain(|k, _| k.sta != sta);
        self.attainable.retain(|k, _| k.sta != sta);
    }

    // ─── Pushes ─────────────────────────────────────────────────────

    pub fn push_traffic(&mut self, sta: NodeId, sample: TrafficSample) {
        let depth = self.depth;
        self.traffic
            .entry(sta)
            .or_insert_with(|| Window::new(depth))
            .push(sample);
    }

    pub fn push_signal(&mut self, link: LinkKey, sample: SignalSample) {
        let depth = self.depth;
        self.signal
            .entry(link)
            .or_insert_with(|| Window::new(depth))
            .push(sample);
    }

    pub fn push_delivery(&mut self, link: LinkKey, sample: DeliverySample) {
        let depth = self.depth;
        self.delivery
            .entry(link)
            .or_insert_with(|| Window::new(depth))
            .push(sample);
    }

    pub fn set_attainable(&mut self, link: LinkKey, per_window: Vec<f64>) {
        self.attainable.insert(link, per_window);
    }

    /// Drop the delivery history of a link, e.g. after the station left it.
    pub fn clear_delivery(&mut self, link: LinkKey) {
        if let Some(w) = self.delivery.get_mut(&link) {
            w.clear();
        }
    }

    pub fn accumulate(&mut self, ap: NodeId, attempts: u64, successes: u64) -> bool {
        match self.aggregates.get_mut(&ap) {
            Some(agg) => {
                agg.accumulate(attempts, successes);
                true
            }
            None => false,
        }
    }

    pub fn rotate(&mut self, ap: NodeId) {
        if let Some(agg) = self.aggregates.get_mut(&ap) {
            agg.rotate();
        }
    }

    // ─── Reads ──────────────────────────────────────────────────────

    pub fn traffic(&self, sta: NodeId) -> Option<&Window<TrafficSample>> {
        self.traffic.get(&sta)
    }

    pub fn signal(&self, link: LinkKey) -> Option<&Window<SignalSample>> {
        self.signal.get(&link)
    }

    pub fn delivery(&self, link: LinkKey) -> Option<&Window<DeliverySample>> {
        self.delivery.get(&link)
    }

    pub fn attainable(&self, link: LinkKey) -> Option<&[f64]> {
        self.attainable.get(&link).map(Vec::as_slice)
    }

    pub fn aggregate(&self, ap: NodeId) -> Option<&ApAggregate> {
        self.aggregates.get(&ap)
    }

    pub fn access_points(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.aggregates.keys().copied()
    }

    pub fn stations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.traffic.keys().copied()
    }

    pub fn signal_links(&self) -> impl Iterator<Item = (&LinkKey, &Window<SignalSample>)> {
        self.signal.iter()
    }

    pub fn delivery_links(&self) -> impl Iterator<Item = (&LinkKey, &Window<DeliverySample>)> {
        self.delivery.iter()
    }

    pub fn attainable_links(&self) -> impl Iterator<Item = &LinkKey> {
        self.attainable.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(n: u8) -> NodeId {
        NodeId::new([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn window_keeps_newest_first_and_truncates() {
        let mut w = Window::new(3);
        for v in 1..=4 {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.iter().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert_eq!(w.latest(), Some(&4));
        assert!(w.is_full());
    }

    #[test]
    fn window_clear_empties() {
        let mut w = Window::new(2);
        w.push(1.0);
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.get(0), None);
    }

    #[test]
    fn aggregate_rotates_and_zeroes_slot_zero() {
        let mut agg = ApAggregate::new(3);
        agg.accumulate(10, 8);
        agg.accumulate(5, 5);
        assert_eq!(agg.attempts(0), 15);
        assert_eq!(agg.successes(0), 13);

        agg.rotate();
        assert_eq!(agg.attempts(0), 0);
        assert_eq!(agg.attempts(1), 15);
        assert_eq!(agg.successes(1), 13);

        agg.rotate();
        agg.rotate();
        assert_eq!(agg.attempts(1), 0);
        assert_eq!(agg.attempts(2), 0);
    }

    #[test]
    fn committed_slot_survives_rotation_at_depth_one() {
        let mut agg = ApAggregate::new(1);
        agg.accumulate(100, 50);
        agg.rotate();
        assert_eq!(agg.attempts(0), 0);
        assert_eq!(agg.committed(), (100, 50));
        assert_eq!(agg.committed_pdr(), 0.5);

        agg.rotate();
        assert_eq!(agg.committed(), (0, 0));
        assert_eq!(agg.committed_pdr(), 1.0);
    }

    #[test]
    fn idle_aggregate_pdr_is_one() {
        let agg = ApAggregate::new(4);
        assert_eq!(agg.pdr(0), 1.0);
    }

    #[test]
    fn aggregate_pdr_is_ratio() {
        let mut agg = ApAggregate::new(4);
        agg.accumulate(20, 15);
        assert!((agg.pdr(0) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn removing_station_tears_down_links() {
        let mut store = SampleStore::new(4);
        let (ap, sta) = (node(1), node(2));
        store.add_access_point(ap);
        store.add_station(sta);
        store.push_signal(
            LinkKey::new(ap, sta),
            SignalSample {
                rssi_dbm: -60.0,
                phy_rate_kbps: Some(54_000),
            },
        );
        store.push_delivery(
            LinkKey::new(ap, sta),
            DeliverySample {
                pdr: 1.0,
                throughput_kbps: 100.0,
                selected_rate: Some(108),
            },
        );
        store.remove_station(sta);
        assert!(!store.has_station(sta));
        assert!(store.signal(LinkKey::new(ap, sta)).is_none());
        assert!(store.delivery(LinkKey::new(ap, sta)).is_none());
        assert!(store.has_access_point(ap));
    }

    #[test]
    fn accumulate_unknown_ap_reports_false() {
        let mut store = SampleStore::new(4);
        assert!(!store.accumulate(node(9), 1, 1));
    }

    proptest! {
        #[test]
        fn window_never_exceeds_depth(depth in 1usize..32, values in proptest::collection::vec(any::<u32>(), 0..100)) {
            let mut w = Window::new(depth);
            for v in &values {
                w.push(*v);
            }
            prop_assert_eq!(w.len(), values.len().min(depth));
            let expected: Vec<u32> = values.iter().rev().take(depth).copied().collect();
            prop_assert_eq!(w.iter().copied().collect::<Vec<_>>(), expected);
        }

        #[test]
        fn aggregate_keeps_depth_slots(depth in 1usize..16, rotations in 0usize..40) {
            let mut agg = ApAggregate::new(depth);
            for i in 0..rotations {
                agg.accumulate(i as u64 + 1, i as u64);
                agg.rotate();
            }
            prop_assert_eq!(agg.attempts(0), 0);
            for k in 1..depth {
                let expected = if k <= rotations { (rotations - k + 1) as u64 } else { 0 };
                prop_assert_eq!(agg.attempts(k), expected);
            }
            prop_assert_eq!(agg.attempts(depth), 0);
        }
    }
}
