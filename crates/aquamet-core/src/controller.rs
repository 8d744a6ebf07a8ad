//! Seam to the surrounding wireless controller: topology queries and the
//! re-association side effect.

use crate::error::ControllerError;
use crate::types::{AccessPoint, NodeId, RadioBlock};

/// Topology and re-association interface provided by the controller.
///
/// Implemented by the production controller binding and by simulated
/// networks in tests.
pub trait Controller: Send {
    /// All known access points, with their connection state.
    fn access_points(&self) -> Vec<AccessPoint>;

    /// Stations currently associated with `block`.
    fn stations_on(&self, block: &RadioBlock) -> Vec<NodeId>;

    /// Radio block currently serving `sta`, if it is associated.
    fn serving_block(&self, sta: NodeId) -> Option<RadioBlock>;

    /// Move `sta` to `target`. Fire-and-forget: the engine logs failures and
    /// does not retry.
    fn reassociate(&self, sta: NodeId, target: &RadioBlock) -> Result<(), ControllerError>;
}
