//! Web-push subscription bookkeeping. Delivery happens elsewhere.

use anyhow::Result;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::now_timestamp;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionInput {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub keys: SubscriptionKeys,
}

/// A subscription with every required field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription<'a> {
    pub endpoint: &'a str,
    pub p256dh: &'a str,
    pub auth: &'a str,
}

impl SubscriptionInput {
    pub fn validate(&self) -> Option<Subscription<'_>> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        Some(Subscription {
            endpoint: present(&self.endpoint)?,
            p256dh: present(&self.keys.p256dh)?,
            auth: present(&self.keys.auth)?,
        })
    }
}

/// Stores the subscription (keyed on endpoint) and makes sure the user has
/// a notification settings row.
pub async fn subscribe(
    pool: &SqlitePool,
    user_id: &str,
    sub: &Subscription<'_>,
    user_agent: Option<&str>,
) -> Result<()> {
    let now = now_timestamp();
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, user_agent, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(endpoint) DO UPDATE SET
            user_id = excluded.user_id,
            p256dh = excluded.p256dh,
            auth = excluded.auth,
            user_agent = excluded.user_agent,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(sub.endpoint)
    .bind(sub.p256dh)
    .bind(sub.auth)
    .bind(user_agent)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO notification_settings (user_id, enabled, updated_at)
        VALUES (?, 1, ?)
        ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(user_id, "push subscription saved");
    Ok(())
}

/// Removes one subscription, or all of the user's when `endpoint` is `None`.
/// Returns the number of rows removed.
pub async fn unsubscribe(pool: &SqlitePool, user_id: &str, endpoint: Option<&str>) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM push_subscriptions WHERE user_id = ? AND (? IS NULL OR endpoint = ?)",
    )
    .bind(user_id)
    .bind(endpoint)
    .bind(endpoint)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
