//! # aquamet-core
//!
//! Per-link Wi-Fi telemetry estimation and attainable-throughput handover
//! decisions for controller-managed access networks.
//!
//! ## Crate structure
//!
//! - [`types`] — Node identifiers, link keys, radio blocks
//! - [`window`] — Newest-first sliding windows and per-AP aggregates
//! - [`rate`] — RSSI → SNR → MCS → PHY rate lookup
//! - [`traffic`] — Counter and rate-histogram deltas
//! - [`airtime`] — CSMA/CA contention model and satisfaction probability
//! - [`trigger`] — RSSI threshold triggers
//! - [`engine`] — Ingest handlers and the per-tick decision loop
//! - [`runtime`] — Worker thread driving the engine on a tick interval
//! - [`controller`] — Topology and re-association seam
//! - [`stats`] — Events, tick reports and JSON snapshots

pub mod airtime;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod rate;
pub mod runtime;
pub mod stats;
pub mod traffic;
pub mod trigger;
pub mod types;
pub mod window;

pub use config::EngineConfig;
pub use controller::Controller;
pub use engine::{HandoverEngine, Telemetry};
pub use error::{ControllerError, EstimateError};
pub use runtime::EngineRuntime;
pub use stats::{EngineEvent, EngineSnapshot, QosPhase, TickReport};
pub use types::{AccessPoint, Band, LinkKey, NodeId, RadioBlock};
