//! Activity log storage (meal, exercise, medication, sleep).

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{
    format_date, normalize_timestamp, now_timestamp, HealthLog, LogCategory,
};

const LOG_COLUMNS: &str = "id, user_id, category, note, logged_at, sub_type, quantity, unit, \
     schedule_id, sleep_duration_hours, meal_description, image_url, exercise_type, \
     duration_minutes, heart_rate, intensity_metrics, medication_name, created_at";

/// Request body for creating or editing a log. Absent fields are left
/// untouched on edit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogInput {
    pub category: Option<String>,
    pub note: Option<String>,
    pub logged_at: Option<String>,
    pub sub_type: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub schedule_id: Option<String>,
    pub sleep_duration_hours: Option<f64>,
    pub meal_description: Option<String>,
    pub image_url: Option<String>,
    pub exercise_type: Option<String>,
    pub duration_minutes: Option<i64>,
    pub heart_rate: Option<i64>,
    pub intensity_metrics: Option<serde_json::Value>,
    pub medication_name: Option<String>,
}

fn blank_to_none(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Coach reaction shown right after a log is saved.
pub fn instant_feedback(category: LogCategory, sleep_hours: Option<f64>) -> &'static str {
    match category {
        LogCategory::Meal => "식사 기록 반영했어요. 영양 밸런스 분석에 반영됩니다.",
        LogCategory::Exercise => "운동 기록 감사해요! 강도와 회복 패턴을 반영할게요.",
        LogCategory::Medication => {
            "방금 기록하신 약은 식후 30분이 중요합니다! 꾸준히 챙기시면 좋아요."
        }
        LogCategory::Sleep => match sleep_hours {
            Some(h) if h < 6.0 => "오늘 수면 시간이 부족하네요. 오후에 짧은 낮잠을 추천드려요.",
            Some(h) if h >= 8.0 => "수면 기록 감사해요. 충분한 휴식이 회복에 도움이 됩니다.",
            _ => "수면 기록 반영했어요. 회복 패턴 분석에 활용할게요.",
        },
    }
}

pub async fn insert_log(
    pool: &SqlitePool,
    user_id: &str,
    category: LogCategory,
    input: &LogInput,
) -> Result<HealthLog> {
    let id = Uuid::new_v4().to_string();
    let logged_at = match blank_to_none(&input.logged_at) {
        Some(ts) => normalize_timestamp(ts)?,
        None => now_timestamp(),
    };
    let intensity = input
        .intensity_metrics
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO health_logs (
            id, user_id, category, note, logged_at, sub_type, quantity, unit, schedule_id,
            sleep_duration_hours, meal_description, image_url, exercise_type,
            duration_minutes, heart_rate, intensity_metrics, medication_name, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(category.as_str())
    .bind(blank_to_none(&input.note))
    .bind(&logged_at)
    .bind(blank_to_none(&input.sub_type))
    .bind(input.quantity)
    .bind(blank_to_none(&input.unit))
    .bind(blank_to_none(&input.schedule_id))
    .bind(input.sleep_duration_hours)
    .bind(blank_to_none(&input.meal_description))
    .bind(blank_to_none(&input.image_url))
    .bind(blank_to_none(&input.exercise_type))
    .bind(input.duration_minutes)
    .bind(input.heart_rate)
    .bind(intensity)
    .bind(blank_to_none(&input.medication_name))
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    get_log(pool, user_id, &id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("log {} not found after insert", id))
}

pub async fn get_log(pool: &SqlitePool, user_id: &str, id: &str) -> Result<Option<HealthLog>> {
    let sql = format!(
        "SELECT {} FROM health_logs WHERE id = ? AND user_id = ?",
        LOG_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(HealthLog::from_row))
}

/// Applies the provided fields to an owned log. Returns the previous and
/// updated rows, or `None` when the log does not exist for this user.
pub async fn update_log(
    pool: &SqlitePool,
    user_id: &str,
    id: &str,
    category: Option<LogCategory>,
    input: &LogInput,
) -> Result<Option<(HealthLog, HealthLog)>> {
    let Some(before) = get_log(pool, user_id, id).await? else {
        return Ok(None);
    };

    let logged_at = blank_to_none(&input.logged_at)
        .map(normalize_timestamp)
        .transpose()?;
    let intensity = input
        .intensity_metrics
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE health_logs SET
            category = COALESCE(?, category),
            note = COALESCE(?, note),
            logged_at = COALESCE(?, logged_at),
            sub_type = COALESCE(?, sub_type),
            quantity = COALESCE(?, quantity),
            unit = COALESCE(?, unit),
            schedule_id = COALESCE(?, schedule_id),
            sleep_duration_hours = COALESCE(?, sleep_duration_hours),
            meal_description = COALESCE(?, meal_description),
            image_url = COALESCE(?, image_url),
            exercise_type = COALESCE(?, exercise_type),
            duration_minutes = COALESCE(?, duration_minutes),
            heart_rate = COALESCE(?, heart_rate),
            intensity_metrics = COALESCE(?, intensity_metrics),
            medication_name = COALESCE(?, medication_name)
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(category.map(|c| c.as_str()))
    .bind(blank_to_none(&input.note))
    .bind(logged_at)
    .bind(blank_to_none(&input.sub_type))
    .bind(input.quantity)
    .bind(blank_to_none(&input.unit))
    .bind(blank_to_none(&input.schedule_id))
    .bind(input.sleep_duration_hours)
    .bind(blank_to_none(&input.meal_description))
    .bind(blank_to_none(&input.image_url))
    .bind(blank_to_none(&input.exercise_type))
    .bind(input.duration_minutes)
    .bind(input.heart_rate)
    .bind(intensity)
    .bind(blank_to_none(&input.medication_name))
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    let after = get_log(pool, user_id, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("log {} not found after update", id))?;
    Ok(Some((before, after)))
}

/// Removes an owned log and returns it.
pub async fn delete_log(pool: &SqlitePool, user_id: &str, id: &str) -> Result<Option<HealthLog>> {
    let Some(existing) = get_log(pool, user_id, id).await? else {
        return Ok(None);
    };
    sqlx::query("DELETE FROM health_logs WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(Some(existing))
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<LogCategory>,
}

/// Newest first.
pub async fn list_logs(
    pool: &SqlitePool,
    user_id: &str,
    filter: &LogFilter,
) -> Result<Vec<HealthLog>> {
    let sql = format!(
        r#"
        SELECT {} FROM health_logs
        WHERE user_id = ?
          AND (? IS NULL OR logged_at >= ?)
          AND (? IS NULL OR logged_at <= ?)
          AND (? IS NULL OR category = ?)
        ORDER BY logged_at DESC
        "#,
        LOG_COLUMNS
    );
    let start = filter
        .start_date
        .map(|d| format!("{}T00:00:00", format_date(d)));
    let end = filter
        .end_date
        .map(|d| format!("{}T23:59:59", format_date(d)));
    let category = filter.category.map(|c| c.as_str());

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .bind(category)
        .bind(category)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(HealthLog::from_row).collect())
}

/// Oldest first, for aggregation.
pub async fn logs_between(
    pool: &SqlitePool,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<HealthLog>> {
    let mut logs = list_logs(
        pool,
        user_id,
        &LogFilter {
            start_date: Some(start),
            end_date: Some(end),
            category: None,
        },
    )
    .await?;
    logs.reverse();
    Ok(logs)
}

pub async fn last_meal_at(pool: &SqlitePool, user_id: &str) -> Result<Option<String>> {
    let ts: Option<String> = sqlx::query_scalar(
        "SELECT logged_at FROM health_logs WHERE user_id = ? AND category = 'meal' \
         ORDER BY logged_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(ts)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TodayStats {
    pub meal: usize,
    pub exercise: usize,
    pub medication: usize,
    pub sleep: usize,
}

pub fn today_stats(logs: &[HealthLog], today: NaiveDate) -> TodayStats {
    let prefix = format_date(today);
    let mut stats = TodayStats::default();
    for log in logs.iter().filter(|l| l.logged_at.starts_with(&prefix)) {
        match log.category() {
            Some(LogCategory::Meal) => stats.meal += 1,
            Some(LogCategory::Exercise) => stats.exercise += 1,
            Some(LogCategory::Medication) => stats.medication += 1,
            Some(LogCategory::Sleep) => stats.sleep += 1,
            None => {}
        }
    }
    stats
}
