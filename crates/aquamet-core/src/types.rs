//! Node identities and topology keys.
//!
//! Every map in the engine is keyed either by a [`NodeId`] (per access point
//! or per station) or by a [`LinkKey`] (per access-point/station pair). No
//! other key shapes exist.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 6-byte hardware address identifying an access point or a station.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId([u8; 6]);

impl NodeId {
    pub const fn new(octets: [u8; 6]) -> Self {
        NodeId(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// Error returned when a hardware address string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hardware address: {0:?}")]
pub struct ParseNodeIdError(pub String);

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| ParseNodeIdError(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseNodeIdError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseNodeIdError(s.to_string()));
        }
        Ok(NodeId(octets))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical (access point, station) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub ap: NodeId,
    pub sta: NodeId,
}

impl LinkKey {
    pub fn new(ap: NodeId, sta: NodeId) -> Self {
        LinkKey { ap, sta }
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.ap, self.sta)
    }
}

/// Frequency band of a radio block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[serde(rename = "5GHz")]
    Ghz5,
}

/// One (access point, channel, band) triple able to serve stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RadioBlock {
    pub ap: NodeId,
    pub channel: u8,
    pub band: Band,
}

/// Access point as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub id: NodeId,
    pub connected: bool,
    pub blocks: Vec<RadioBlock>,
}
