//! Daily points: allocation, caps, and the per-user points ledger.
//!
//! | Activity | Points |
//! |----------|--------|
//! | exercise (any) | 3 |
//! | meal | 1 per meal, at most 3 |
//! | medication (any) | 2 |
//! | sleep (any) | 2 |
//!
//! The day total is capped (10 by default) and the yearly total is capped
//! (3650 by default). Every log mutation calls [`refresh_day`], which
//! recomputes the affected day and moves the annual total by the
//! difference.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::ScoringConfig;
use crate::models::{format_date, LogCategory};
use crate::ranking::{self, day_bounds};

pub const POINTS_EXERCISE: i64 = 3;
pub const POINTS_MEAL_PER: i64 = 1;
pub const POINTS_MEAL_CAP: i64 = 3;
pub const POINTS_MEDICATION: i64 = 2;
pub const POINTS_SLEEP: i64 = 2;

/// What a user logged on one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayActivity {
    pub meal_count: i64,
    pub has_exercise: bool,
    pub has_medication: bool,
    pub has_sleep: bool,
}

impl DayActivity {
    pub fn from_categories<'a>(categories: impl IntoIterator<Item = &'a str>) -> Self {
        let mut activity = Self::default();
        for c in categories {
            match LogCategory::parse(c) {
                Some(LogCategory::Meal) => activity.meal_count += 1,
                Some(LogCategory::Exercise) => activity.has_exercise = true,
                Some(LogCategory::Medication) => activity.has_medication = true,
                Some(LogCategory::Sleep) => activity.has_sleep = true,
                None => {}
            }
        }
        activity
    }
}

pub fn daily_score(activity: &DayActivity, daily_cap: i64) -> i64 {
    let meals = activity.meal_count.clamp(0, POINTS_MEAL_CAP) * POINTS_MEAL_PER;
    let exercise = if activity.has_exercise { POINTS_EXERCISE } else { 0 };
    let medication = if activity.has_medication {
        POINTS_MEDICATION
    } else {
        0
    };
    let sleep = if activity.has_sleep { POINTS_SLEEP } else { 0 };
    (meals + exercise + medication + sleep).min(daily_cap)
}

/// Stored `user_points` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointsRecord {
    pub daily_points: i64,
    pub annual_points: i64,
    pub last_updated_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PointsView {
    pub daily_points: i64,
    pub annual_points: i64,
    pub last_updated_date: Option<String>,
    pub daily_remaining: i64,
    pub annual_remaining: i64,
    pub daily_cap: i64,
    pub annual_cap: i64,
}

/// Daily points only count for the day they were earned.
pub fn points_view(record: &PointsRecord, today: NaiveDate, caps: &ScoringConfig) -> PointsView {
    let today_str = format_date(today);
    let daily = if record.last_updated_date.as_deref() == Some(today_str.as_str()) {
        record.daily_points
    } else {
        0
    };
    PointsView {
        daily_points: daily,
        annual_points: record.annual_points,
        last_updated_date: record.last_updated_date.clone(),
        daily_remaining: (caps.daily_cap - daily).max(0),
        annual_remaining: (caps.annual_cap - record.annual_points).max(0),
        daily_cap: caps.daily_cap,
        annual_cap: caps.annual_cap,
    }
}

/// Loads the user's ledger, inserting a zeroed row on first access.
pub async fn get_or_init_points(
    pool: &SqlitePool,
    user_id: &str,
    today: NaiveDate,
) -> Result<PointsRecord> {
    sqlx::query(
        r#"
        INSERT INTO user_points (user_id, daily_points, annual_points, last_updated_date)
        VALUES (?, 0, 0, ?)
        ON CONFLICT(user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(format_date(today))
    .execute(pool)
    .await?;

    let row = sqlx::query(
        "SELECT daily_points, annual_points, last_updated_date FROM user_points WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(PointsRecord {
        daily_points: row.get("daily_points"),
        annual_points: row.get("annual_points"),
        last_updated_date: row.get("last_updated_date"),
    })
}

/// Result of recomputing one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayRefresh {
    pub points: i64,
    pub previous_points: i64,
    pub ranking_score: Option<f64>,
}

/// Recomputes points and the ranking score for `user_id` on `date`.
///
/// Writes the day's points to `daily_score_history`, adjusts
/// `user_points`, and keeps the user's `health_scores` row in step (the row
/// is removed when the day no longer has any logs).
pub async fn refresh_day(
    pool: &SqlitePool,
    caps: &ScoringConfig,
    user_id: &str,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<DayRefresh> {
    let (start, end) = day_bounds(date);
    let date_str = format_date(date);

    let categories: Vec<String> = sqlx::query_scalar(
        "SELECT category FROM health_logs WHERE user_id = ? AND logged_at >= ? AND logged_at <= ?",
    )
    .bind(user_id)
    .bind(&start)
    .bind(&end)
    .fetch_all(pool)
    .await?;

    let activity = DayActivity::from_categories(categories.iter().map(String::as_str));
    let points = daily_score(&activity, caps.daily_cap);
    let ranking_score = ranking::user_score_for_date(pool, user_id, date).await?;

    let chart_number: Option<Option<String>> =
        sqlx::query_scalar("SELECT chart_number FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    let chart_number = chart_number.flatten().filter(|c| !c.trim().is_empty());

    let mut tx = pool.begin().await?;

    let previous: Option<i64> = sqlx::query_scalar(
        "SELECT score FROM daily_score_history WHERE user_id = ? AND score_date = ?",
    )
    .bind(user_id)
    .bind(&date_str)
    .fetch_optional(&mut *tx)
    .await?;
    let previous = previous.unwrap_or(0);

    sqlx::query(
        r#"
        INSERT INTO daily_score_history (user_id, score_date, score)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id, score_date) DO UPDATE SET score = excluded.score
        "#,
    )
    .bind(user_id)
    .bind(&date_str)
    .bind(points)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO user_points (user_id, daily_points, annual_points, last_updated_date)
        VALUES (?, 0, 0, NULL)
        ON CONFLICT(user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let annual: i64 =
        sqlx::query_scalar("SELECT annual_points FROM user_points WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
    let new_annual = (annual + points - previous).clamp(0, caps.annual_cap);

    if date == today {
        sqlx::query(
            r#"
            UPDATE user_points
            SET daily_points = ?, annual_points = ?, last_updated_date = ?
            WHERE user_id = ?
            "#,
        )
        .bind(points)
        .bind(new_annual)
        .bind(&date_str)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    } else {
        sqlx::query("UPDATE user_points SET annual_points = ? WHERE user_id = ?")
            .bind(new_annual)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(chart) = &chart_number {
        match ranking_score {
            Some(score) => {
                sqlx::query(
                    r#"
                    INSERT INTO health_scores (chart_number, score_date, score)
                    VALUES (?, ?, ?)
                    ON CONFLICT(chart_number, score_date) DO UPDATE SET score = excluded.score
                    "#,
                )
                .bind(chart)
                .bind(&date_str)
                .bind(score)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM health_scores WHERE chart_number = ? AND score_date = ?")
                    .bind(chart)
                    .bind(&date_str)
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }

    tx.commit().await?;

    tracing::debug!(
        user_id,
        date = %date_str,
        points,
        previous,
        annual = new_annual,
        "refreshed daily score"
    );

    Ok(DayRefresh {
        points,
        previous_points: previous,
        ranking_score,
    })
}
