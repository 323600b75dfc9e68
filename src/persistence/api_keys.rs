//! DAO for the `api_keys` table (spec §3 `ApiKey`, §4.5 authentication path).

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::ApiKey;

use super::Db;

/// The join row the Tenant Gate's authentication path needs in one query
/// (spec §4.5: "a single parameterized lookup joins apiKey (active) with
/// its user and active subscription").
pub struct AuthLookupRow {
    pub api_key: ApiKey,
    pub user_id: Uuid,
    pub user_plan: String,
    pub user_status: String,
    pub subscription_id: Option<Uuid>,
    pub subscription_status: Option<String>,
    pub monthly_quota: Option<i64>,
    pub current_usage: Option<i64>,
    pub rate_limit_per_minute: Option<i64>,
    pub billing_period_end: Option<i64>,
}

pub struct ApiKeyDao;

impl ApiKeyDao {
    pub async fn find_by_hash(db: &Db, key_hash: &str) -> Result<Option<AuthLookupRow>, AppError> {
        let conn = db.lock().await;
        conn.query_row(
            "SELECT k.id, k.user_id, k.key_hash, k.key_prefix, k.name, k.active, k.total_calls,
                    k.created_at, k.revoked_at, k.expires_at,
                    u.plan, u.status,
                    s.id, s.status, s.monthly_quota, s.current_usage, s.rate_limit_per_minute, s.billing_period_end
             FROM api_keys k
             JOIN users u ON u.id = k.user_id
             LEFT JOIN subscriptions s ON s.user_id = k.user_id AND s.status = 'active'
             WHERE k.key_hash = ?1 AND k.active = 1",
            params![key_hash],
            |row| {
                let id: String = row.get(0)?;
                let user_id: String = row.get(1)?;
                let sub_id: Option<String> = row.get(12)?;
                Ok(AuthLookupRow {
                    api_key: ApiKey {
                        id: Uuid::parse_str(&id).unwrap_or_default(),
                        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
                        key_hash: row.get(2)?,
                        key_prefix: row.get(3)?,
                        name: row.get(4)?,
                        active: row.get::<_, i64>(5)? != 0,
                        total_calls: row.get(6)?,
                        created_at: row.get(7)?,
                        revoked_at: row.get(8)?,
                        expires_at: row.get(9)?,
                    },
                    user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
                    user_plan: row.get(10)?,
                    user_status: row.get(11)?,
                    subscription_id: sub_id.and_then(|s| Uuid::parse_str(&s).ok()),
                    subscription_status: row.get(13)?,
                    monthly_quota: row.get(14)?,
                    current_usage: row.get(15)?,
                    rate_limit_per_minute: row.get(16)?,
                    billing_period_end: row.get(17)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub async fn insert(db: &Db, key: &ApiKey) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO api_keys (id, user_id, key_hash, key_prefix, name, active, total_calls,
                created_at, revoked_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                key.id.to_string(),
                key.user_id.to_string(),
                key.key_hash,
                key.key_prefix,
                key.name,
                key.active as i64,
                key.total_calls,
                key.created_at,
                key.revoked_at,
                key.expires_at,
            ],
        )?;
        Ok(())
    }

    pub async fn list_for_user(db: &Db, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        let conn = db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, key_hash, key_prefix, name, active, total_calls, created_at,
                    revoked_at, expires_at
             FROM api_keys WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id.to_string()], row_to_key)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Revoking an already-revoked key is a no-op (spec §8).
    pub async fn revoke(db: &Db, user_id: Uuid, key_id: Uuid, now: i64) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE api_keys SET active = 0, revoked_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND active = 1",
            params![now, key_id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn increment_total_calls(db: &Db, key_id: Uuid) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE api_keys SET total_calls = total_calls + 1 WHERE id = ?1",
            params![key_id.to_string()],
        )?;
        Ok(())
    }
}

fn row_to_key(row: &rusqlite::Row) -> rusqlite::Result<ApiKey> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    Ok(ApiKey {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        key_hash: row.get(2)?,
        key_prefix: row.get(3)?,
        name: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
        total_calls: row.get(6)?,
        created_at: row.get(7)?,
        revoked_at: row.get(8)?,
        expires_at: row.get(9)?,
    })
}
