//! DAO for `api_usage_logs` (spec §4.5 point 4).

use rusqlite::params;
use uuid::Uuid;

use crate::error::AppError;
use crate::model::ApiUsageLog;

use super::Db;

pub struct UsageDao;

impl UsageDao {
    pub async fn insert(db: &Db, log: &ApiUsageLog) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO api_usage_logs (user_id, api_key_id, endpoint, method, status_code,
                response_time_ms, user_agent, ip_address, request_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                log.user_id.to_string(),
                log.api_key_id.to_string(),
                log.endpoint,
                log.method,
                log.status_code as i64,
                log.response_time_ms as i64,
                log.user_agent,
                log.ip_address,
                log.request_id,
                log.timestamp,
            ],
        )?;
        Ok(())
    }

    pub async fn recent_for_user(db: &Db, user_id: Uuid, limit: i64) -> Result<Vec<ApiUsageLog>, AppError> {
        let conn = db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT user_id, api_key_id, endpoint, method, status_code, response_time_ms,
                    user_agent, ip_address, request_id, timestamp
             FROM api_usage_logs WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id.to_string(), limit], |row| {
                let user_id: String = row.get(0)?;
                let api_key_id: String = row.get(1)?;
                Ok(ApiUsageLog {
                    user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
                    api_key_id: Uuid::parse_str(&api_key_id).unwrap_or_default(),
                    endpoint: row.get(2)?,
                    method: row.get(3)?,
                    status_code: row.get::<_, i64>(4)? as u16,
                    response_time_ms: row.get::<_, i64>(5)? as u64,
                    user_agent: row.get(6)?,
                    ip_address: row.get(7)?,
                    request_id: row.get(8)?,
                    timestamp: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
