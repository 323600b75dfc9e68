//! DAO for the `subscriptions` table (spec §3 `Subscription`, §4.5 quota).

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{Plan, Subscription, SubscriptionStatus};

use super::Db;

pub struct SubscriptionDao;

impl SubscriptionDao {
    pub async fn get_active_for_user(db: &Db, user_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let conn = db.lock().await;
        conn.query_row(
            "SELECT id, user_id, plan, monthly_quota, rate_limit_per_minute, current_usage,
                    billing_period_start, billing_period_end, status, price_cents, cancelled_at
             FROM subscriptions WHERE user_id = ?1 AND status = 'active'",
            params![user_id.to_string()],
            row_to_subscription,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub async fn insert(db: &Db, sub: &Subscription) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "INSERT INTO subscriptions (id, user_id, plan, monthly_quota, rate_limit_per_minute,
                current_usage, billing_period_start, billing_period_end, status, price_cents, cancelled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                sub.id.to_string(),
                sub.user_id.to_string(),
                sub.plan.as_str(),
                sub.monthly_quota,
                sub.rate_limit_per_minute,
                sub.current_usage,
                sub.billing_period_start,
                sub.billing_period_end,
                status_str(sub.status),
                sub.price_cents,
                sub.cancelled_at,
            ],
        )?;
        Ok(())
    }

    pub async fn update_plan(
        db: &Db,
        subscription_id: Uuid,
        plan: Plan,
    ) -> Result<(), AppError> {
        let terms = plan.catalog();
        let conn = db.lock().await;
        conn.execute(
            "UPDATE subscriptions SET plan = ?1, monthly_quota = ?2, rate_limit_per_minute = ?3,
                price_cents = ?4 WHERE id = ?5",
            params![
                plan.as_str(),
                terms.monthly_quota,
                terms.rate_limit_per_minute,
                terms.price_cents,
                subscription_id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// `user.cancelled`: marks the subscription cancelled and stamps
    /// `cancelled_at` in the same statement.
    pub async fn cancel(db: &Db, subscription_id: Uuid, now: i64) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE subscriptions SET status = 'cancelled', cancelled_at = ?1 WHERE id = ?2",
            params![now, subscription_id.to_string()],
        )?;
        Ok(())
    }

    /// `user.renewed`: reactivate, reset usage, advance the billing window by one month.
    pub async fn renew(
        db: &Db,
        subscription_id: Uuid,
        new_period_start: i64,
        new_period_end: i64,
    ) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE subscriptions SET status = 'active', current_usage = 0,
                billing_period_start = ?1, billing_period_end = ?2 WHERE id = ?3",
            params![new_period_start, new_period_end, subscription_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn increment_usage(db: &Db, subscription_id: Uuid) -> Result<(), AppError> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE subscriptions SET current_usage = current_usage + 1 WHERE id = ?1",
            params![subscription_id.to_string()],
        )?;
        Ok(())
    }
}

fn status_str(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Cancelled => "cancelled",
        SubscriptionStatus::Expired => "expired",
    }
}

fn row_to_subscription(row: &rusqlite::Row) -> rusqlite::Result<Subscription> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let plan: String = row.get(2)?;
    let status: String = row.get(8)?;
    Ok(Subscription {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        plan: Plan::from_str(&plan).unwrap_or(Plan::Starter),
        monthly_quota: row.get(3)?,
        rate_limit_per_minute: row.get(4)?,
        current_usage: row.get(5)?,
        billing_period_start: row.get(6)?,
        billing_period_end: row.get(7)?,
        status: match status.as_str() {
            "cancelled" => SubscriptionStatus::Cancelled,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Active,
        },
        price_cents: row.get(9)?,
        cancelled_at: row.get(10)?,
    })
}
