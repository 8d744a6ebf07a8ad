//! Error taxonomy for the estimation pipeline.
//!
//! None of these escape a tick: the engine logs them and falls back to
//! "no data this window".

use crate::types::{LinkKey, NodeId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimateError {
    #[error("negative SNR {snr_db:.1} dB (rssi {rssi_dbm:.1} dBm)")]
    NegativeSnr { rssi_dbm: f64, snr_db: f64 },
    #[error("no usable MCS at SNR index {snr_index}")]
    UnusableMcs { snr_index: usize },
    #[error("counter regression for {node}: {counter} went from {prev} to {now}")]
    CounterRegression {
        node: NodeId,
        counter: &'static str,
        prev: u64,
        now: u64,
    },
    #[error("unknown {kind} {node}")]
    MissingTopology { kind: &'static str, node: NodeId },
    #[error("insufficient history for {link}: have {have}, need {need}")]
    InsufficientHistory { link: LinkKey, have: usize, need: usize },
    #[error("topology precondition violated on {ap}: {reason}")]
    PreconditionViolated { ap: NodeId, reason: &'static str },
}

/// Failure reported by the external controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("re-association rejected: {0}")]
    Rejected(String),
}
