//! DAO for the `entities` table (spec §3 `Entity`, §5 "Entity lookup").

use rusqlite::{params, OptionalExtension};

use crate::error::AppError;
use crate::model::{Entity, EntityKind, RiskLevel};

use super::Db;

pub struct EntityDao;

impl EntityDao {
    pub async fn get(db: &Db, address: &str) -> Result<Option<Entity>, AppError> {
        let conn = db.lock().await;
        conn.query_row(
            "SELECT address, entity_type, name, risk_level, risk_score, metadata
             FROM entities WHERE address = ?1",
            params![address],
            row_to_entity,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub async fn list_all(db: &Db) -> Result<Vec<Entity>, AppError> {
        let conn = db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT address, entity_type, name, risk_level, risk_score, metadata FROM entities",
        )?;
        let rows = stmt
            .query_map([], row_to_entity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn upsert(db: &Db, entity: &Entity) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO entities (address, entity_type, name, risk_level, risk_score, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(address) DO UPDATE SET
                entity_type = excluded.entity_type,
                name = excluded.name,
                risk_level = excluded.risk_level,
                risk_score = excluded.risk_score,
                metadata = excluded.metadata",
            params![
                entity.address,
                entity.entity_kind.as_str(),
                entity.name,
                entity.risk_level.as_str(),
                entity.risk_score,
                entity.metadata.to_string(),
            ],
        )?;
        Ok(())
    }
}

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
    let kind: String = row.get(1)?;
    let risk_level: String = row.get(3)?;
    let metadata: String = row.get(5)?;
    Ok(Entity {
        address: row.get(0)?,
        entity_kind: EntityKind::from_str(&kind).unwrap_or(EntityKind::Wallet),
        name: row.get(2)?,
        risk_level: RiskLevel::from_str(&risk_level).unwrap_or(RiskLevel::Low),
        risk_score: row.get(4)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}
