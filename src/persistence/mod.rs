//! Relational persistence (spec §6 "Persisted state"). SQLite via rusqlite,
//! opened and migrated the way the teacher's `api::db` does it: a single
//! `Arc<Mutex<Connection>>` handed to every DAO submodule.

mod api_keys;
mod entities;
mod flow_paths;
mod risk_flags;
mod subscriptions;
mod usage;
mod users;
mod webhooks;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

pub use api_keys::ApiKeyDao;
pub use entities::EntityDao;
pub use flow_paths::FlowPathDao;
pub use risk_flags::RiskFlagDao;
pub use subscriptions::SubscriptionDao;
pub use usage::UsageDao;
pub use users::UserDao;
pub use webhooks::WebhookDao;

pub type Db = Arc<Mutex<Connection>>;

pub fn open(path: &Path) -> Result<Db> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("creating db directory")?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("opening sqlite at {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database, used by tests and by `Config::in_memory_db`.
pub fn open_in_memory() -> Result<Db> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id               TEXT PRIMARY KEY,
            email            TEXT UNIQUE NOT NULL,
            full_name        TEXT,
            company_name     TEXT,
            plan             TEXT NOT NULL,
            status           TEXT NOT NULL,
            external_user_id TEXT UNIQUE,
            created_at       INTEGER NOT NULL,
            last_login_at    INTEGER
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id                   TEXT PRIMARY KEY,
            user_id              TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            plan                 TEXT NOT NULL,
            monthly_quota        INTEGER NOT NULL,
            rate_limit_per_minute INTEGER NOT NULL,
            current_usage        INTEGER NOT NULL DEFAULT 0,
            billing_period_start INTEGER NOT NULL,
            billing_period_end   INTEGER NOT NULL,
            status               TEXT NOT NULL,
            price_cents          INTEGER NOT NULL,
            cancelled_at         INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_one_active
            ON subscriptions(user_id) WHERE status = 'active';

        CREATE TABLE IF NOT EXISTS api_keys (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            key_hash    TEXT NOT NULL,
            key_prefix  TEXT NOT NULL,
            name        TEXT,
            active      INTEGER NOT NULL DEFAULT 1,
            total_calls INTEGER NOT NULL DEFAULT 0,
            created_at  INTEGER NOT NULL,
            revoked_at  INTEGER,
            expires_at  INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_api_keys_key_hash ON api_keys(key_hash);
        CREATE INDEX IF NOT EXISTS idx_api_keys_user_id ON api_keys(user_id);

        CREATE TABLE IF NOT EXISTS transactions (
            signature  TEXT PRIMARY KEY,
            block_time INTEGER NOT NULL,
            slot       INTEGER NOT NULL,
            fee        INTEGER NOT NULL,
            success    INTEGER NOT NULL,
            payload    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transfers (
            signature         TEXT NOT NULL,
            instruction_index INTEGER NOT NULL,
            from_address      TEXT NOT NULL,
            to_address        TEXT NOT NULL,
            token_mint        TEXT NOT NULL,
            amount            TEXT NOT NULL,
            decimals          INTEGER NOT NULL,
            block_time        INTEGER NOT NULL,
            tx_type           TEXT NOT NULL,
            swap_direction    TEXT,
            swap_info         TEXT,
            PRIMARY KEY (signature, instruction_index)
        );
        CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers(from_address);
        CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers(to_address);
        CREATE INDEX IF NOT EXISTS idx_transfers_mint ON transfers(token_mint);
        CREATE INDEX IF NOT EXISTS idx_transfers_signature ON transfers(signature);

        CREATE TABLE IF NOT EXISTS flow_paths (
            path_id          TEXT PRIMARY KEY,
            start_address    TEXT NOT NULL,
            end_address      TEXT NOT NULL,
            token_mint       TEXT NOT NULL,
            hops             TEXT NOT NULL,
            total_amount     TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            intent           TEXT,
            intent_confidence REAL,
            risk_score       INTEGER,
            risk_level       TEXT,
            created_at       INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_flow_paths_start ON flow_paths(start_address);
        CREATE INDEX IF NOT EXISTS idx_flow_paths_end ON flow_paths(end_address);

        CREATE TABLE IF NOT EXISTS entities (
            address     TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            name        TEXT,
            risk_level  TEXT NOT NULL,
            risk_score  INTEGER NOT NULL,
            metadata    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);

        CREATE TABLE IF NOT EXISTS risk_flags (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            address     TEXT NOT NULL,
            kind        TEXT NOT NULL,
            severity    TEXT NOT NULL,
            detail      TEXT,
            created_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_risk_flags_address ON risk_flags(address);

        CREATE TABLE IF NOT EXISTS webhook_events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            source        TEXT NOT NULL,
            event_type    TEXT NOT NULL,
            payload       TEXT NOT NULL,
            received_at   INTEGER NOT NULL,
            processed     INTEGER NOT NULL DEFAULT 0,
            processed_at  INTEGER,
            error_message TEXT
        );

        CREATE TABLE IF NOT EXISTS api_usage_logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL,
            api_key_id      TEXT NOT NULL,
            endpoint        TEXT NOT NULL,
            method          TEXT NOT NULL,
            status_code     INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            user_agent      TEXT,
            ip_address      TEXT,
            request_id      TEXT NOT NULL,
            timestamp       INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_usage_logs_user_ts ON api_usage_logs(user_id, timestamp DESC);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let db = open_in_memory().unwrap();
        let conn = db.lock().await;
        migrate(&conn).unwrap();
    }
}
