//! Menstrual cycle records and next-start prediction.

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{format_date, now_timestamp, parse_date};
use crate::schedules;

pub const DEFAULT_CYCLE_LENGTH: i64 = 28;
/// Cycles considered when averaging.
pub const PREDICTION_WINDOW: usize = 6;
/// Days past the predicted start before a cycle counts as late.
pub const LATE_THRESHOLD_DAYS: i64 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct CycleLog {
    pub id: String,
    pub user_id: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub cycle_length: Option<i64>,
    pub notes: Option<String>,
    pub created_at: String,
}

impl CycleLog {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
            cycle_length: row.get("cycle_length"),
            notes: row.get("notes"),
            created_at: row.get("created_at"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclePrediction {
    pub average_cycle_length: i64,
    pub predicted_next_date: Option<String>,
    pub confidence: Confidence,
    pub data_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LateStatus {
    pub is_late: bool,
    pub days_late: i64,
}

/// Predicts the next start from cycles ordered newest first.
///
/// Only cycles with a known positive length are averaged, but the
/// prediction is anchored on the newest start regardless.
pub fn predict(cycles: &[CycleLog]) -> CyclePrediction {
    let lengths: Vec<i64> = cycles
        .iter()
        .filter_map(|c| c.cycle_length.filter(|l| *l > 0))
        .take(PREDICTION_WINDOW)
        .collect();

    let anchor = cycles.first().and_then(|c| parse_date(&c.start_date).ok());
    let (Some(anchor), false) = (anchor, lengths.is_empty()) else {
        return CyclePrediction {
            average_cycle_length: DEFAULT_CYCLE_LENGTH,
            predicted_next_date: None,
            confidence: Confidence::Low,
            data_points: 0,
        };
    };

    let average = (lengths.iter().sum::<i64>() as f64 / lengths.len() as f64).round() as i64;
    let confidence = match lengths.len() {
        n if n >= 6 => Confidence::High,
        n if n >= 3 => Confidence::Medium,
        _ => Confidence::Low,
    };

    CyclePrediction {
        average_cycle_length: average,
        predicted_next_date: Some(format_date(anchor + chrono::Duration::days(average))),
        confidence,
        data_points: lengths.len(),
    }
}

pub fn late_status(predicted: Option<&str>, today: NaiveDate) -> LateStatus {
    let Some(predicted) = predicted.and_then(|p| parse_date(p).ok()) else {
        return LateStatus {
            is_late: false,
            days_late: 0,
        };
    };
    let days = (today - predicted).num_days();
    LateStatus {
        is_late: days >= LATE_THRESHOLD_DAYS,
        days_late: days.max(0),
    }
}

async fn recent_cycles(pool: &SqlitePool, user_id: &str, limit: i64) -> Result<Vec<CycleLog>> {
    let rows = sqlx::query(
        "SELECT * FROM cycle_logs WHERE user_id = ? ORDER BY start_date DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(CycleLog::from_row).collect())
}

/// Records a new cycle start. The length of the previous cycle is the gap
/// between the two starts. Afterwards the monthly reminder is moved to the
/// day of the newly predicted start.
pub async fn start_cycle(
    pool: &SqlitePool,
    user_id: &str,
    start_date: NaiveDate,
    notes: Option<&str>,
) -> Result<CycleLog> {
    let previous = recent_cycles(pool, user_id, 1).await?;
    let cycle_length = previous
        .first()
        .and_then(|p| parse_date(&p.start_date).ok())
        .map(|prev| (start_date - prev).num_days());

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO cycle_logs (id, user_id, start_date, end_date, cycle_length, notes, created_at)
        VALUES (?, ?, ?, NULL, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(format_date(start_date))
    .bind(cycle_length)
    .bind(notes.map(str::trim).filter(|n| !n.is_empty()))
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    let window = recent_cycles(pool, user_id, PREDICTION_WINDOW as i64).await?;
    let prediction = predict(&window);
    if let Some(next) = prediction
        .predicted_next_date
        .as_deref()
        .and_then(|d| parse_date(d).ok())
    {
        if let Err(e) = schedules::upsert_cycle_reminder(pool, user_id, next.day()).await {
            tracing::warn!(user_id, error = %e, "failed to update cycle reminder");
        }
    }

    let row = sqlx::query("SELECT * FROM cycle_logs WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(CycleLog::from_row(&row))
}

/// Closes the newest open cycle. `None` when nothing is in progress.
pub async fn end_cycle(
    pool: &SqlitePool,
    user_id: &str,
    end_date: NaiveDate,
) -> Result<Option<CycleLog>> {
    let open: Option<String> = sqlx::query_scalar(
        "SELECT id FROM cycle_logs WHERE user_id = ? AND end_date IS NULL \
         ORDER BY start_date DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    let Some(id) = open else {
        return Ok(None);
    };

    sqlx::query("UPDATE cycle_logs SET end_date = ? WHERE id = ?")
        .bind(format_date(end_date))
        .bind(&id)
        .execute(pool)
        .await?;

    let row = sqlx::query("SELECT * FROM cycle_logs WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(Some(CycleLog::from_row(&row)))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOverview {
    pub cycles: Vec<CycleLog>,
    pub prediction: CyclePrediction,
    pub late_status: LateStatus,
    pub current_cycle: Option<CycleLog>,
    pub total_records: usize,
}

/// Cycles from the past year with prediction and lateness.
pub async fn overview(pool: &SqlitePool, user_id: &str, today: NaiveDate) -> Result<CycleOverview> {
    let since = today
        .with_year(today.year() - 1)
        .unwrap_or(today - chrono::Duration::days(365));
    let rows = sqlx::query(
        "SELECT * FROM cycle_logs WHERE user_id = ? AND start_date >= ? ORDER BY start_date DESC",
    )
    .bind(user_id)
    .bind(format_date(since))
    .fetch_all(pool)
    .await?;
    let cycles: Vec<CycleLog> = rows.iter().map(CycleLog::from_row).collect();

    let prediction = predict(&cycles);
    let late = if cycles.is_empty() {
        late_status(None, today)
    } else {
        late_status(prediction.predicted_next_date.as_deref(), today)
    };
    let current_cycle = cycles.iter().find(|c| c.end_date.is_none()).cloned();

    Ok(CycleOverview {
        total_records: cycles.len(),
        cycles,
        prediction,
        late_status: late,
        current_cycle,
    })
}

pub async fn delete_cycle(pool: &SqlitePool, user_id: &str, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cycle_logs WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(start: &str, length: Option<i64>) -> CycleLog {
        CycleLog {
            id: start.to_string(),
            user_id: "u".to_string(),
            start_date: start.to_string(),
            end_date: None,
            cycle_length: length,
            notes: None,
            created_at: String::new(),
        }
    }

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_no_lengths_means_default_prediction() {
        let p = predict(&[cycle("2025-03-01", None)]);
        assert_eq!(p.average_cycle_length, 28);
        assert_eq!(p.predicted_next_date, None);
        assert_eq!(p.confidence, Confidence::Low);
        assert_eq!(p.data_points, 0);
        assert_eq!(predict(&[]).data_points, 0);
    }

    #[test]
    fn test_prediction_anchored_on_newest_start() {
        let cycles = vec![
            cycle("2025-03-29", Some(29)),
            cycle("2025-02-28", Some(30)),
            cycle("2025-01-29", Some(27)),
        ];
        let p = predict(&cycles);
        // (29 + 30 + 27) / 3 = 28.67
        assert_eq!(p.average_cycle_length, 29);
        assert_eq!(p.predicted_next_date.as_deref(), Some("2025-04-27"));
        assert_eq!(p.confidence, Confidence::Medium);
        assert_eq!(p.data_points, 3);
    }

    #[test]
    fn test_prediction_uses_at_most_six_cycles() {
        let mut cycles: Vec<CycleLog> = (0..6).map(|_| cycle("2025-06-01", Some(30))).collect();
        cycles.push(cycle("2024-12-01", Some(60)));
        let p = predict(&cycles);
        assert_eq!(p.average_cycle_length, 30);
        assert_eq!(p.confidence, Confidence::High);
    }

    #[test]
    fn test_late_status() {
        assert_eq!(
            late_status(Some("2025-04-01"), d("2025-04-03")),
            LateStatus {
                is_late: false,
                days_late: 2
            }
        );
        assert!(late_status(Some("2025-04-01"), d("2025-04-04")).is_late);
        assert_eq!(late_status(Some("2025-04-10"), d("2025-04-01")).days_late, 0);
        assert!(!late_status(None, d("2025-04-01")).is_late);
    }

    #[test]
    fn test_prediction_serialises_camel_case() {
        let json = serde_json::to_value(predict(&[])).unwrap();
        assert_eq!(json["averageCycleLength"], 28);
        assert_eq!(json["confidence"], "low");
        assert!(json["predictedNextDate"].is_null());
    }
}
