use serde::{Deserialize, Serialize};

use crate::trigger::Relation;
use crate::types::{LinkKey, NodeId, RadioBlock};

/// Events emitted by the engine, either while ingesting telemetry or at
/// the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A signal sample satisfied a configured trigger.
    SignalTriggered {
        ap: NodeId,
        sta: NodeId,
        relation: Relation,
        threshold_dbm: i8,
        rssi_dbm: f64,
    },
    /// A monitored station fell below the tolerance on its serving AP.
    QosDegraded { sta: NodeId, ap: NodeId, p_good: f64 },
    /// The engine asked the controller to move a station.
    HandoverTriggered {
        sta: NodeId,
        from: NodeId,
        to: RadioBlock,
        p_from: f64,
        p_to: f64,
    },
    /// The controller refused or could not perform a re-association.
    HandoverFailed { sta: NodeId, to: RadioBlock, reason: String },
}

/// Handover state of a monitored station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosPhase {
    #[default]
    Unassociated,
    Warming,
    Evaluating,
    Stable,
    HandingOver,
}

impl QosPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            QosPhase::Unassociated => "unassociated",
            QosPhase::Warming => "warming",
            QosPhase::Evaluating => "evaluating",
            QosPhase::Stable => "stable",
            QosPhase::HandingOver => "handing_over",
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub events: Vec<EngineEvent>,
}

impl TickReport {
    pub fn handovers(&self) -> impl Iterator<Item = &EngineEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, EngineEvent::HandoverTriggered { .. }))
    }
}

/// Latest per-link readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub ap: NodeId,
    pub sta: NodeId,
    pub rssi_dbm: Option<f64>,
    pub phy_rate_kbps: Option<u32>,
    pub pdr: Option<f64>,
    pub throughput_kbps: Option<f64>,
    pub selected_rate: Option<u32>,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attainable_kbps: Option<Vec<f64>>,
}

impl LinkSnapshot {
    pub fn empty(link: LinkKey) -> Self {
        LinkSnapshot {
            ap: link.ap,
            sta: link.sta,
            rssi_dbm: None,
            phy_rate_kbps: None,
            pdr: None,
            throughput_kbps: None,
            selected_rate: None,
            samples: 0,
            attainable_kbps: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApSnapshot {
    pub ap: NodeId,
    /// Aggregate PDR over the most recently completed tick.
    pub aggr_pdr: f64,
    pub attempts: u64,
    pub successes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredSnapshot {
    pub sta: NodeId,
    pub phase: QosPhase,
    pub serving_ap: Option<NodeId>,
    pub samples: u64,
    pub p_good: Option<f64>,
}

/// Serializable view of the engine state after a tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub schema_version: i32,
    pub tick: u64,
    pub links: Vec<LinkSnapshot>,
    pub access_points: Vec<ApSnapshot>,
    pub monitored: Vec<MonitoredSnapshot>,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn link(&self, link: LinkKey) -> Option<&LinkSnapshot> {
        self.links.iter().find(|l| l.ap == link.ap && l.sta == link.sta)
    }
}
