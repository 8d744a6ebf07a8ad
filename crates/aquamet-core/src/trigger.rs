//! Threshold triggers evaluated against every signal-quality sample.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "LT")]
    Lt,
    #[serde(rename = "GE")]
    Ge,
    #[serde(rename = "LE")]
    Le,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Eq => "EQ",
            Relation::Gt => "GT",
            Relation::Lt => "LT",
            Relation::Ge => "GE",
            Relation::Le => "LE",
        }
    }

    /// Radios report RSSI as whole dBm, so `Eq` compares the rounded value.
    pub fn holds(&self, current_dbm: f64, threshold_dbm: i8) -> bool {
        let t = f64::from(threshold_dbm);
        match self {
            Relation::Eq => current_dbm.round() == t,
            Relation::Gt => current_dbm > t,
            Relation::Lt => current_dbm < t,
            Relation::Ge => current_dbm >= t,
            Relation::Le => current_dbm <= t,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EQ" => Ok(Relation::Eq),
            "GT" => Ok(Relation::Gt),
            "LT" => Ok(Relation::Lt),
            "GE" => Ok(Relation::Ge),
            "LE" => Ok(Relation::Le),
            other => Err(format!(
                "unknown relation {other:?}, valid relations are EQ, GT, LT, GE, LE"
            )),
        }
    }
}

/// Fires whenever a sample satisfies `rssi <relation> threshold_dbm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTrigger {
    pub relation: Relation,
    pub threshold_dbm: i8,
}

impl SignalTrigger {
    pub fn matches(&self, rssi_dbm: f64) -> bool {
        self.relation.holds(rssi_dbm, self.threshold_dbm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relations_compare_against_threshold() {
        assert!(Relation::Lt.holds(-85.0, -80));
        assert!(!Relation::Lt.holds(-80.0, -80));
        assert!(Relation::Le.holds(-80.0, -80));
        assert!(Relation::Gt.holds(-60.0, -80));
        assert!(Relation::Ge.holds(-80.0, -80));
        assert!(Relation::Eq.holds(-80.4, -80));
        assert!(!Relation::Eq.holds(-81.0, -80));
    }

    #[test]
    fn relation_parse_is_case_insensitive() {
        assert_eq!("le".parse::<Relation>().unwrap(), Relation::Le);
        assert!("NE".parse::<Relation>().is_err());
    }

    #[test]
    fn trigger_matches() {
        let t = SignalTrigger {
            relation: Relation::Lt,
            threshold_dbm: -90,
        };
        assert!(t.matches(-91.0));
        assert!(!t.matches(-50.0));
    }
}
