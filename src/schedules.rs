//! Recurring reminders (meal, exercise, medication, cycle).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::now_timestamp;

pub const CATEGORIES: [&str; 4] = ["meal", "exercise", "medication", "cycle"];
pub const FREQUENCIES: [&str; 4] = ["daily", "weekly", "monthly", "once"];

pub const CYCLE_REMINDER_SUB_TYPE: &str = "reminder";
pub const CYCLE_REMINDER_TITLE: &str = "그날 예정일 알림";
pub const CYCLE_REMINDER_TIME: &str = "09:00";

/// Unknown categories fall back to `meal`.
pub fn normalize_category(value: Option<&str>) -> &'static str {
    value
        .and_then(|v| CATEGORIES.iter().find(|c| **c == v.trim()))
        .copied()
        .unwrap_or("meal")
}

/// Unknown frequencies fall back to `daily`.
pub fn normalize_frequency(value: Option<&str>) -> &'static str {
    value
        .and_then(|v| FREQUENCIES.iter().find(|f| **f == v.trim()))
        .copied()
        .unwrap_or("daily")
}

#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub sub_type: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub frequency: String,
    pub scheduled_time: Option<String>,
    pub days_of_week: Vec<i64>,
    pub day_of_month: Option<i64>,
    pub is_active: bool,
    pub notification_enabled: bool,
    pub created_at: String,
}

impl Schedule {
    fn from_row(row: &SqliteRow) -> Self {
        let days: Option<String> = row.get("days_of_week");
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            category: row.get("category"),
            sub_type: row.get("sub_type"),
            title: row.get("title"),
            description: row.get("description"),
            frequency: row.get("frequency"),
            scheduled_time: row.get("scheduled_time"),
            days_of_week: days
                .and_then(|d| serde_json::from_str(&d).ok())
                .unwrap_or_default(),
            day_of_month: row.get("day_of_month"),
            is_active: row.get("is_active"),
            notification_enabled: row.get("notification_enabled"),
            created_at: row.get("created_at"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    pub category: Option<String>,
    pub sub_type: Option<String>,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub frequency: Option<String>,
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub days_of_week: Vec<i64>,
    pub day_of_month: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub notification_enabled: bool,
}

fn default_true() -> bool {
    true
}

pub async fn list_schedules(
    pool: &SqlitePool,
    user_id: &str,
    category: Option<&str>,
) -> Result<Vec<Schedule>> {
    let category = category.filter(|c| CATEGORIES.contains(c));
    let rows = sqlx::query(
        r#"
        SELECT * FROM schedules
        WHERE user_id = ? AND (? IS NULL OR category = ?)
        ORDER BY scheduled_time ASC
        "#,
    )
    .bind(user_id)
    .bind(category)
    .bind(category)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(Schedule::from_row).collect())
}

/// Replaces every schedule in each category present in `inputs`.
/// Categories not mentioned keep their schedules.
pub async fn replace_schedules(
    pool: &SqlitePool,
    user_id: &str,
    inputs: &[ScheduleInput],
) -> Result<Vec<Schedule>> {
    let mut categories: Vec<&'static str> = inputs
        .iter()
        .map(|s| normalize_category(s.category.as_deref()))
        .collect();
    categories.sort_unstable();
    categories.dedup();

    let mut tx = pool.begin().await?;
    for category in &categories {
        sqlx::query("DELETE FROM schedules WHERE user_id = ? AND category = ?")
            .bind(user_id)
            .bind(*category)
            .execute(&mut *tx)
            .await?;
    }

    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO schedules (
                id, user_id, category, sub_type, title, description, frequency,
                scheduled_time, days_of_week, day_of_month, is_active,
                notification_enabled, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(normalize_category(input.category.as_deref()))
        .bind(&input.sub_type)
        .bind(&input.title)
        .bind(&input.description)
        .bind(normalize_frequency(input.frequency.as_deref()))
        .bind(&input.scheduled_time)
        .bind(serde_json::to_string(&input.days_of_week)?)
        .bind(input.day_of_month.filter(|d| *d > 0))
        .bind(input.is_active)
        .bind(input.notification_enabled)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;
        ids.push(id);
    }
    tx.commit().await?;

    let all = list_schedules(pool, user_id, None).await?;
    Ok(all.into_iter().filter(|s| ids.contains(&s.id)).collect())
}

pub async fn delete_schedule(pool: &SqlitePool, user_id: &str, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM schedules WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Creates or moves the monthly cycle reminder to `day_of_month`.
pub async fn upsert_cycle_reminder(
    pool: &SqlitePool,
    user_id: &str,
    day_of_month: u32,
) -> Result<()> {
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM schedules WHERE user_id = ? AND category = 'cycle' AND sub_type = ? LIMIT 1",
    )
    .bind(user_id)
    .bind(CYCLE_REMINDER_SUB_TYPE)
    .fetch_optional(pool)
    .await?;

    match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE schedules SET day_of_month = ?, is_active = 1, frequency = 'monthly' WHERE id = ?",
            )
            .bind(day_of_month as i64)
            .bind(&id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO schedules (
                    id, user_id, category, sub_type, title, description, frequency,
                    scheduled_time, days_of_week, day_of_month, is_active,
                    notification_enabled, created_at
                ) VALUES (?, ?, 'cycle', ?, ?, NULL, 'monthly', ?, '[]', ?, 1, 1, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user_id)
            .bind(CYCLE_REMINDER_SUB_TYPE)
            .bind(CYCLE_REMINDER_TITLE)
            .bind(CYCLE_REMINDER_TIME)
            .bind(day_of_month as i64)
            .bind(now_timestamp())
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}

/// Number of active medication reminders, used as the expected daily dose count.
pub async fn active_medication_count(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM schedules WHERE user_id = ? AND category = 'medication' AND is_active = 1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category(Some("exercise")), "exercise");
        assert_eq!(normalize_category(Some("cycle")), "cycle");
        assert_eq!(normalize_category(Some("sleep")), "meal");
        assert_eq!(normalize_category(None), "meal");
    }

    #[test]
    fn test_normalize_frequency() {
        assert_eq!(normalize_frequency(Some("weekly")), "weekly");
        assert_eq!(normalize_frequency(Some("hourly")), "daily");
    }
}
