//! DAO for `flow_paths` (spec §4.3: "every produced FlowPath is persisted,
//! upsert by pathId").

use rusqlite::params;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{Amount, FlowPath, PathNode, RiskLevel};

use super::Db;

pub struct FlowPathDao;

impl FlowPathDao {
    pub async fn upsert(db: &Db, path: &FlowPath, now: i64) -> Result<(), AppError> {
        let hops_json = serde_json::to_string(&path.hops).unwrap_or_default();
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO flow_paths (path_id, start_address, end_address, token_mint, hops,
                total_amount, confidence_score, intent, intent_confidence, risk_score, risk_level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(path_id) DO UPDATE SET
                hops = excluded.hops,
                total_amount = excluded.total_amount,
                confidence_score = excluded.confidence_score,
                intent = excluded.intent,
                intent_confidence = excluded.intent_confidence,
                risk_score = excluded.risk_score,
                risk_level = excluded.risk_level",
            params![
                path.path_id.to_string(),
                path.start_address,
                path.end_address,
                path.token_mint,
                hops_json,
                path.total_amount.as_decimal_string(),
                path.confidence_score,
                path.intent,
                path.intent_confidence,
                path.risk_score,
                path.risk_level.map(|l| l.as_str()),
                now,
            ],
        )?;
        Ok(())
    }

    pub async fn get(db: &Db, path_id: Uuid) -> Result<Option<FlowPath>, AppError> {
        use rusqlite::OptionalExtension;
        let conn = db.lock().await;
        conn.query_row(
            "SELECT path_id, start_address, end_address, token_mint, hops, total_amount,
                    confidence_score, intent, intent_confidence, risk_score, risk_level
             FROM flow_paths WHERE path_id = ?1",
            params![path_id.to_string()],
            row_to_path,
        )
        .optional()
        .map_err(AppError::from)
    }
}

fn row_to_path(row: &rusqlite::Row) -> rusqlite::Result<FlowPath> {
    let path_id: String = row.get(0)?;
    let hops_json: String = row.get(4)?;
    let total_amount: String = row.get(5)?;
    let risk_level: Option<String> = row.get(10)?;
    let hops: Vec<PathNode> = serde_json::from_str(&hops_json).unwrap_or_default();
    Ok(FlowPath {
        path_id: Uuid::parse_str(&path_id).unwrap_or_default(),
        start_address: row.get(1)?,
        end_address: row.get(2)?,
        token_mint: row.get(3)?,
        hops,
        total_amount: total_amount.parse::<u128>().map(Amount).unwrap_or(Amount::ZERO),
        confidence_score: row.get(6)?,
        intent: row.get(7)?,
        intent_confidence: row.get(8)?,
        risk_score: row.get(9)?,
        risk_level: risk_level.and_then(|s| RiskLevel::from_str(&s)),
    })
}
