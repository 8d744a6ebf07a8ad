use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::rate::PhyStandard;
use crate::trigger::{Relation, SignalTrigger};
use crate::types::NodeId;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfigInput {
    pub version: u32,
    pub window_depth: Option<usize>,
    pub tick_ms: Option<u64>,
    pub threshold_kbps: Option<f64>,
    pub tolerance: Option<f64>,
    pub noise_floor_dbm: Option<f64>,
    pub phy_standard: Option<String>,
    pub monitored: Vec<String>,
    pub airtime: AirtimeConfigInput,
    pub signal_triggers: Vec<SignalTriggerInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AirtimeConfigInput {
    pub difs_us: Option<f64>,
    pub sifs_us: Option<f64>,
    pub preamble_us: Option<f64>,
    pub mac_header_bytes: Option<u32>,
    pub ack_bytes: Option<u32>,
    pub ack_rate_threshold_kbps: Option<u32>,
    pub ack_high_rate_kbps: Option<u32>,
    pub ack_fallback_rate_kbps: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignalTriggerInput {
    pub relation: String,
    pub value: i64,
}

/// MAC/PHY timing constants for the airtime model. Times in microseconds,
/// rates in kbps.
#[derive(Debug, Clone, PartialEq)]
pub struct AirtimeConfig {
    pub difs_us: f64,
    pub sifs_us: f64,
    pub preamble_us: f64,
    pub mac_header_bytes: u32,
    pub ack_bytes: u32,
    /// Data rates at or above this get the high ACK rate.
    pub ack_rate_threshold_kbps: u32,
    pub ack_high_rate_kbps: u32,
    pub ack_fallback_rate_kbps: u32,
}

impl Default for AirtimeConfig {
    fn default() -> Self {
        Self {
            difs_us: 34.0,
            sifs_us: 16.0,
            preamble_us: 20.0,
            mac_header_bytes: 34,
            ack_bytes: 14,
            ack_rate_threshold_kbps: 24_000,
            ack_high_rate_kbps: 24_000,
            ack_fallback_rate_kbps: 2_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub version: u32,
    pub window_depth: usize,
    pub tick: Duration,
    pub threshold_kbps: f64,
    pub tolerance: f64,
    pub noise_floor_dbm: f64,
    pub phy_standard: PhyStandard,
    pub monitored: Vec<NodeId>,
    pub airtime: AirtimeConfig,
    pub signal_triggers: Vec<SignalTrigger>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            window_depth: 20,
            tick: Duration::from_millis(500),
            threshold_kbps: 1_000.0,
            tolerance: 0.7,
            noise_floor_dbm: -95.0,
            phy_standard: PhyStandard::G20,
            monitored: Vec::new(),
            airtime: AirtimeConfig::default(),
            signal_triggers: Vec::new(),
        }
    }
}

impl AirtimeConfigInput {
    fn resolve(self) -> anyhow::Result<AirtimeConfig> {
        let d = AirtimeConfig::default();
        let cfg = AirtimeConfig {
            difs_us: self.difs_us.unwrap_or(d.difs_us).max(0.0),
            sifs_us: self.sifs_us.unwrap_or(d.sifs_us).max(0.0),
            preamble_us: self.preamble_us.unwrap_or(d.preamble_us).max(0.0),
            mac_header_bytes: self.mac_header_bytes.unwrap_or(d.mac_header_bytes),
            ack_bytes: self.ack_bytes.unwrap_or(d.ack_bytes),
            ack_rate_threshold_kbps: self
                .ack_rate_threshold_kbps
                .unwrap_or(d.ack_rate_threshold_kbps),
            ack_high_rate_kbps: self.ack_high_rate_kbps.unwrap_or(d.ack_high_rate_kbps),
            ack_fallback_rate_kbps: self
                .ack_fallback_rate_kbps
                .unwrap_or(d.ack_fallback_rate_kbps),
        };
        if cfg.ack_high_rate_kbps == 0 || cfg.ack_fallback_rate_kbps == 0 {
            bail!("ACK rates must be non-zero");
        }
        Ok(cfg)
    }
}

impl EngineConfigInput {
    pub fn resolve(self) -> anyhow::Result<EngineConfig> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            bail!("Unsupported config version {}", version);
        }

        let d = EngineConfig::default();
        let phy_standard = match self.phy_standard {
            Some(s) => s.parse::<PhyStandard>().map_err(anyhow::Error::msg)?,
            None => d.phy_standard,
        };

        let mut monitored = Vec::new();
        for mac in &self.monitored {
            let id: NodeId = mac
                .parse()
                .with_context(|| format!("invalid monitored station {mac:?}"))?;
            if !monitored.contains(&id) {
                monitored.push(id);
            }
        }

        let mut signal_triggers = Vec::new();
        for t in self.signal_triggers {
            let relation = t.relation.parse::<Relation>().map_err(anyhow::Error::msg)?;
            let threshold_dbm = i8::try_from(t.value)
                .map_err(|_| anyhow::anyhow!("rssi trigger requires -128 <= value <= 127"))?;
            signal_triggers.push(SignalTrigger {
                relation,
                threshold_dbm,
            });
        }

        Ok(EngineConfig {
            version,
            window_depth: self.window_depth.unwrap_or(d.window_depth).max(1),
            tick: Duration::from_millis(self.tick_ms.unwrap_or(500).max(1)),
            threshold_kbps: self.threshold_kbps.unwrap_or(d.threshold_kbps).max(0.0),
            tolerance: self.tolerance.unwrap_or(d.tolerance).clamp(0.0, 1.0),
            noise_floor_dbm: self.noise_floor_dbm.unwrap_or(d.noise_floor_dbm),
            phy_standard,
            monitored,
            airtime: self.airtime.resolve()?,
            signal_triggers,
        })
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        if input.trim().is_empty() {
            return Ok(EngineConfig::default());
        }
        let parsed: EngineConfigInput = toml::from_str(input).context("Invalid config TOML")?;
        parsed.resolve()
    }
}
