//! DAO for `webhook_events` (spec §3 `WebhookEvent`, §4.5 lifecycle).

use rusqlite::params;

use crate::error::AppError;
use crate::model::WebhookEvent;

use super::Db;

pub struct WebhookDao;

impl WebhookDao {
    /// Every event is logged before handling (spec §4.5, §8 idempotence note).
    pub async fn insert_received(
        db: &Db,
        source: &str,
        event_type: &str,
        payload: &serde_json::Value,
        received_at: i64,
    ) -> Result<i64, AppError> {
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO webhook_events (source, event_type, payload, received_at, processed)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![source, event_type, payload.to_string(), received_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn mark_processed(db: &Db, id: i64, now: i64) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE webhook_events SET processed = 1, processed_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    pub async fn mark_failed(db: &Db, id: i64, error_message: &str) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE webhook_events SET processed = 0, error_message = ?1 WHERE id = ?2",
            params![error_message, id],
        )?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn get(db: &Db, id: i64) -> Result<Option<WebhookEvent>, AppError> {
        use rusqlite::OptionalExtension;
        let conn = db.lock().await;
        conn.query_row(
            "SELECT id, source, event_type, payload, received_at, processed, processed_at, error_message
             FROM webhook_events WHERE id = ?1",
            params![id],
            |row| {
                let payload: String = row.get(3)?;
                Ok(WebhookEvent {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                    received_at: row.get(4)?,
                    processed: row.get::<_, i64>(5)? != 0,
                    processed_at: row.get(6)?,
                    error_message: row.get(7)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }
}
