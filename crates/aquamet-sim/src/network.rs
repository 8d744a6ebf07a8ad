use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use aquamet_core::{AccessPoint, Controller, ControllerError, NodeId, RadioBlock};
use tracing::info;

/// Position of a node on the simulated floor plan, in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    aps: Vec<AccessPoint>,
    positions: BTreeMap<NodeId, Position>,
    assoc: BTreeMap<NodeId, RadioBlock>,
    reassociations: Vec<(NodeId, RadioBlock)>,
}

/// In-memory controller. Clones share the same topology, so the engine and
/// the scenario driving it see each other's changes.
#[derive(Debug, Clone, Default)]
pub struct SimNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_access_point(&self, ap: AccessPoint, at: Position) {
        let mut s = self.lock();
        s.positions.insert(ap.id, at);
        s.aps.retain(|a| a.id != ap.id);
        s.aps.push(ap);
    }

    pub fn set_connected(&self, ap: NodeId, connected: bool) {
        if let Some(a) = self.lock().aps.iter_mut().find(|a| a.id == ap) {
            a.connected = connected;
        }
    }

    pub fn position(&self, ap: NodeId) -> Option<Position> {
        self.lock().positions.get(&ap).copied()
    }

    /// Associate `sta` with `block` without going through the engine.
    pub fn associate(&self, sta: NodeId, block: RadioBlock) {
        self.lock().assoc.insert(sta, block);
    }

    pub fn disassociate(&self, sta: NodeId) {
        self.lock().assoc.remove(&sta);
    }

    /// Re-associations performed on behalf of the engine, oldest first.
    pub fn reassociations(&self) -> Vec<(NodeId, RadioBlock)> {
        self.lock().reassociations.clone()
    }
}

impl Controller for SimNetwork {
    fn access_points(&self) -> Vec<AccessPoint> {
        self.lock().aps.clone()
    }

    fn stations_on(&self, block: &RadioBlock) -> Vec<NodeId> {
        self.lock()
            .assoc
            .iter()
            .filter(|(_, b)| *b == block)
            .map(|(sta, _)| *sta)
            .collect()
    }

    fn serving_block(&self, sta: NodeId) -> Option<RadioBlock> {
        self.lock().assoc.get(&sta).copied()
    }

    fn reassociate(&self, sta: NodeId, target: &RadioBlock) -> Result<(), ControllerError> {
        let mut s = self.lock();
        if !s.assoc.contains_key(&sta) {
            return Err(ControllerError::NodeNotFound(sta));
        }
        let reachable = s
            .aps
            .iter()
            .any(|a| a.id == target.ap && a.connected && a.blocks.contains(target));
        if !reachable {
            return Err(ControllerError::Rejected(format!(
                "{} has no usable block on channel {}",
                target.ap, target.channel
            )));
        }
        info!(sta = %sta, ap = %target.ap, channel = target.channel, "station re-associated");
        s.assoc.insert(sta, *target);
        s.reassociations.push((sta, *target));
        Ok(())
    }
}
