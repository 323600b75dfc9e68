//! Entity and risk-assessment records (spec §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Dex,
    Bridge,
    Lending,
    Mixer,
    Sanctioned,
    Wallet,
    Pool,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Dex => "dex",
            EntityKind::Bridge => "bridge",
            EntityKind::Lending => "lending",
            EntityKind::Mixer => "mixer",
            EntityKind::Sanctioned => "sanctioned",
            EntityKind::Wallet => "wallet",
            EntityKind::Pool => "pool",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "dex" => EntityKind::Dex,
            "bridge" => EntityKind::Bridge,
            "lending" => EntityKind::Lending,
            "mixer" => EntityKind::Mixer,
            "sanctioned" => EntityKind::Sanctioned,
            "wallet" => EntityKind::Wallet,
            "pool" => EntityKind::Pool,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Derivation rule from spec §3: `<25 low, <50 medium, <75 high, else critical`.
    pub fn from_score(score: u8) -> Self {
        if score < 25 {
            RiskLevel::Low
        } else if score < 50 {
            RiskLevel::Medium
        } else if score < 75 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "low" => RiskLevel::Low,
            "medium" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            "critical" => RiskLevel::Critical,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub address: String,
    pub entity_kind: EntityKind,
    pub name: Option<String>,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub metadata: serde_json::Value,
}

/// Severity attached to a risk flag (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlagKind {
    SanctionedDirect,
    SanctionedProximity,
    MixerProximity,
    PeelChain,
    CircularFlow,
    Velocity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFlag {
    pub kind: RiskFlagKind,
    pub severity: FlagSeverity,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub address: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub flags: Vec<RiskFlag>,
    pub last_assessed: i64,
}
