//! DAO for `risk_flags` (spec §4.4: "a RiskFlag history row per flag").

use rusqlite::params;

use crate::error::AppError;
use crate::model::{FlagSeverity, RiskFlag, RiskFlagKind};

use super::Db;

pub struct RiskFlagDao;

impl RiskFlagDao {
    pub async fn insert(db: &Db, address: &str, flag: &RiskFlag, now: i64) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO risk_flags (address, kind, severity, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                address,
                kind_str(flag.kind),
                severity_str(flag.severity),
                flag.detail.to_string(),
                now,
            ],
        )?;
        Ok(())
    }

    pub async fn history_for_address(db: &Db, address: &str) -> Result<Vec<RiskFlag>, AppError> {
        let conn = db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT kind, severity, detail FROM risk_flags WHERE address = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![address], |row| {
                let kind: String = row.get(0)?;
                let severity: String = row.get(1)?;
                let detail: String = row.get(2)?;
                Ok(RiskFlag {
                    kind: parse_kind(&kind),
                    severity: parse_severity(&severity),
                    detail: serde_json::from_str(&detail).unwrap_or(serde_json::Value::Null),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn kind_str(kind: RiskFlagKind) -> &'static str {
    match kind {
        RiskFlagKind::SanctionedDirect => "sanctioned_direct",
        RiskFlagKind::SanctionedProximity => "sanctioned_proximity",
        RiskFlagKind::MixerProximity => "mixer_proximity",
        RiskFlagKind::PeelChain => "peel_chain",
        RiskFlagKind::CircularFlow => "circular_flow",
        RiskFlagKind::Velocity => "velocity",
    }
}

fn parse_kind(s: &str) -> RiskFlagKind {
    match s {
        "sanctioned_direct" => RiskFlagKind::SanctionedDirect,
        "sanctioned_proximity" => RiskFlagKind::SanctionedProximity,
        "mixer_proximity" => RiskFlagKind::MixerProximity,
        "peel_chain" => RiskFlagKind::PeelChain,
        "circular_flow" => RiskFlagKind::CircularFlow,
        _ => RiskFlagKind::Velocity,
    }
}

fn severity_str(severity: FlagSeverity) -> &'static str {
    match severity {
        FlagSeverity::Critical => "critical",
        FlagSeverity::Warning => "warning",
    }
}

fn parse_severity(s: &str) -> FlagSeverity {
    match s {
        "critical" => FlagSeverity::Critical,
        _ => FlagSeverity::Warning,
    }
}
