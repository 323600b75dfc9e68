//! DAO for the `users` table (spec §3 `User`).

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{Plan, User, UserStatus};

use super::Db;

pub struct UserDao;

impl UserDao {
    pub async fn get_by_id(db: &Db, id: Uuid) -> Result<Option<User>, AppError> {
        let conn = db.lock().await;
        conn.query_row(
            "SELECT id, email, full_name, company_name, plan, status, external_user_id, created_at, last_login_at
             FROM users WHERE id = ?1",
            params![id.to_string()],
            row_to_user,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub async fn get_by_email(db: &Db, email: &str) -> Result<Option<User>, AppError> {
        let conn = db.lock().await;
        conn.query_row(
            "SELECT id, email, full_name, company_name, plan, status, external_user_id, created_at, last_login_at
             FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub async fn get_by_external_id(db: &Db, external_user_id: &str) -> Result<Option<User>, AppError> {
        let conn = db.lock().await;
        conn.query_row(
            "SELECT id, email, full_name, company_name, plan, status, external_user_id, created_at, last_login_at
             FROM users WHERE external_user_id = ?1",
            params![external_user_id],
            row_to_user,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub async fn insert(db: &Db, user: &User) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO users (id, email, full_name, company_name, plan, status, external_user_id, created_at, last_login_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id.to_string(),
                user.email,
                user.full_name,
                user.company_name,
                user.plan.as_str(),
                user_status_str(user.status),
                user.external_user_id,
                user.created_at,
                user.last_login_at,
            ],
        )?;
        Ok(())
    }

    pub async fn update_plan(db: &Db, user_id: Uuid, plan: Plan) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE users SET plan = ?1 WHERE id = ?2",
            params![plan.as_str(), user_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn set_status(db: &Db, user_id: Uuid, status: UserStatus) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE users SET status = ?1 WHERE id = ?2",
            params![user_status_str(status), user_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn touch_last_login(db: &Db, user_id: Uuid, now: i64) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
            params![now, user_id.to_string()],
        )?;
        Ok(())
    }
}

fn user_status_str(status: UserStatus) -> &'static str {
    match status {
        UserStatus::Active => "active",
        UserStatus::Cancelled => "cancelled",
        UserStatus::Expired => "expired",
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let plan: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(User {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        email: row.get(1)?,
        full_name: row.get(2)?,
        company_name: row.get(3)?,
        plan: Plan::from_str(&plan).unwrap_or(Plan::Starter),
        status: match status.as_str() {
            "cancelled" => UserStatus::Cancelled,
            "expired" => UserStatus::Expired,
            _ => UserStatus::Active,
        },
        external_user_id: row.get(6)?,
        created_at: row.get(7)?,
        last_login_at: row.get(8)?,
    })
}
