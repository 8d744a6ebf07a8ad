//! # Link-Quality Estimator
//!
//! Maps an RSSI sample to the PHY rate a rate-adaptation algorithm would
//! settle on: `SNR = RSSI - noise floor`, floored to an integer index into a
//! per-standard SNR→MCS table, then MCS→rate in kbps.
//!
//! Pure functions of (RSSI, noise floor, standard).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EstimateError;

/// Table sentinel for "no MCS decodable at this SNR".
const UNUSABLE: i8 = -1;

#[rustfmt::skip]
const G20_MCS: [i8; 51] = [
    -1, -1, 0, 0, 1, 2, 2, 2, 2, 3, 3,
    4, 4, 4, 4, 5, 5, 5, 6, 6, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
];

#[rustfmt::skip]
const N20_MCS: [i8; 51] = [
    -1, -1, 0, 0, 0, 1, 1, 1, 1, 2, 2,
    3, 3, 3, 3, 4, 4, 4, 5, 5, 6,
    6, 6, 6, 6, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
];

#[rustfmt::skip]
const N40_MCS: [i8; 51] = [
    -1, -1, -1, -1, -1, 0, 0, 0, 1, 1, 1,
    1, 2, 2, 3, 3, 3, 3, 4, 4, 4,
    5, 5, 6, 6, 6, 6, 6, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
];

/// 802.11a/g OFDM rates.
const G20_RATE_KBPS: [u32; 8] = [6_000, 9_000, 12_000, 18_000, 24_000, 36_000, 48_000, 54_000];

/// 802.11n single stream, 800 ns guard interval.
const N20_RATE_KBPS: [u32; 8] = [6_500, 13_000, 19_500, 26_000, 39_000, 52_000, 58_500, 65_000];
const N40_RATE_KBPS: [u32; 8] = [
    13_500, 27_000, 40_500, 54_000, 81_000, 108_000, 121_500, 135_000,
];

/// PHY standard whose tables drive the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhyStandard {
    #[default]
    #[serde(rename = "g-20MHz")]
    G20,
    #[serde(rename = "n-20MHz")]
    N20,
    #[serde(rename = "n-40MHz")]
    N40,
}

impl PhyStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhyStandard::G20 => "g-20MHz",
            PhyStandard::N20 => "n-20MHz",
            PhyStandard::N40 => "n-40MHz",
        }
    }

    fn mcs_table(&self) -> &'static [i8] {
        match self {
            PhyStandard::G20 => &G20_MCS,
            PhyStandard::N20 => &N20_MCS,
            PhyStandard::N40 => &N40_MCS,
        }
    }

    fn rate_table(&self) -> &'static [u32] {
        match self {
            PhyStandard::G20 => &G20_RATE_KBPS,
            PhyStandard::N20 => &N20_RATE_KBPS,
            PhyStandard::N40 => &N40_RATE_KBPS,
        }
    }

    /// Highest rate this standard can reach.
    pub fn max_rate_kbps(&self) -> u32 {
        self.rate_table().last().copied().unwrap_or(0)
    }
}

impl fmt::Display for PhyStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhyStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g-20mhz" | "g20mhz" | "g" => Ok(PhyStandard::G20),
            "n-20mhz" | "n20mhz" => Ok(PhyStandard::N20),
            "n-40mhz" | "n40mhz" => Ok(PhyStandard::N40),
            other => Err(format!("unknown PHY standard {other:?}")),
        }
    }
}

/// Integer SNR index, `floor(rssi - noise_floor)`.
pub fn snr_index(rssi_dbm: f64, noise_floor_dbm: f64) -> Result<usize, EstimateError> {
    let snr_db = rssi_dbm - noise_floor_dbm;
    let floored = snr_db.floor();
    if !floored.is_finite() || floored < 0.0 {
        return Err(EstimateError::NegativeSnr { rssi_dbm, snr_db });
    }
    Ok(floored as usize)
}

/// MCS index for an RSSI sample. Indices past the end of the table clamp to
/// the last entry.
pub fn estimated_mcs(
    rssi_dbm: f64,
    noise_floor_dbm: f64,
    standard: PhyStandard,
) -> Result<usize, EstimateError> {
    let idx = snr_index(rssi_dbm, noise_floor_dbm)?;
    let table = standard.mcs_table();
    let mcs = table[idx.min(table.len() - 1)];
    if mcs <= UNUSABLE {
        return Err(EstimateError::UnusableMcs { snr_index: idx });
    }
    Ok(mcs as usize)
}

/// PHY rate in kbps for an MCS index, clamped to the table.
pub fn rate_for_mcs(mcs: usize, standard: PhyStandard) -> u32 {
    let table = standard.rate_table();
    table[mcs.min(table.len() - 1)]
}

/// Estimated PHY sending rate (kbps) for an RSSI sample.
pub fn estimated_rate_kbps(
    rssi_dbm: f64,
    noise_floor_dbm: f64,
    standard: PhyStandard,
) -> Result<u32, EstimateError> {
    estimated_mcs(rssi_dbm, noise_floor_dbm, standard).map(|mcs| rate_for_mcs(mcs, standard))
}
