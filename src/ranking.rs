//! Daily wellness ranking.
//!
//! A user's ranking score for a day is
//!
//! ```text
//! S = (0.4·medication + 0.3·exercise + 0.3·meal) · 100 + streak · 2 + full_day_bonus
//! ```
//!
//! where each activity term is 1 when at least one log of that kind exists
//! on the day, `streak` is the number of consecutive days (ending on the
//! day itself) with any log, and `full_day_bonus` is 5 when all three
//! kinds were logged.
//!
//! Persisted scores in `health_scores` take precedence; when a day has none,
//! the ranking is computed on the fly from `health_logs`. Only users with a
//! chart number take part, and chart numbers are always masked.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{format_date, LogCategory};

const WEIGHT_MEDICATION: f64 = 0.4;
const WEIGHT_EXERCISE: f64 = 0.3;
const WEIGHT_MEAL: f64 = 0.3;
const BASE_SCALE: f64 = 100.0;
const STREAK_BONUS_PER_DAY: f64 = 2.0;
const FULL_DAY_BONUS: f64 = 5.0;
/// How far back streak lookups read logs.
const STREAK_LOOKBACK_DAYS: i64 = 7;
const TOP_N: usize = 10;

pub const DEFAULT_NICKNAME: &str = "회원";
pub const EMPTY_DAY_MESSAGE: &str = "해당 날짜에 기록이 없습니다.";

/// Which weighted activities were logged on a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayFlags {
    pub medication: bool,
    pub exercise: bool,
    pub meal: bool,
}

impl DayFlags {
    pub fn record(&mut self, category: &str) {
        match LogCategory::parse(category) {
            Some(LogCategory::Medication) => self.medication = true,
            Some(LogCategory::Exercise) => self.exercise = true,
            Some(LogCategory::Meal) => self.meal = true,
            _ => {}
        }
    }

    fn is_full_day(&self) -> bool {
        self.medication && self.exercise && self.meal
    }
}

pub fn ranking_score(flags: DayFlags, streak_days: u32) -> f64 {
    let weight = |on: bool, w: f64| if on { w } else { 0.0 };
    let data_part = weight(flags.medication, WEIGHT_MEDICATION)
        + weight(flags.exercise, WEIGHT_EXERCISE)
        + weight(flags.meal, WEIGHT_MEAL);
    let full_day = if flags.is_full_day() {
        FULL_DAY_BONUS
    } else {
        0.0
    };
    data_part * BASE_SCALE + streak_days as f64 * STREAK_BONUS_PER_DAY + full_day
}

/// Consecutive days with activity, counting back from `date` inclusive.
pub fn streak_days(active_days: &BTreeSet<NaiveDate>, date: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut cursor = date;
    while active_days.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

pub fn mask_chart_number(chart_number: &str) -> String {
    if chart_number.chars().count() < 4 {
        return "***".to_string();
    }
    let prefix: String = chart_number.chars().take(3).collect();
    format!("{}***", prefix)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn day_bounds(date: NaiveDate) -> (String, String) {
    let d = format_date(date);
    (format!("{}T00:00:00", d), format!("{}T23:59:59", d))
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub chart_number_masked: String,
    pub nickname: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MyRank {
    pub rank: usize,
    pub score: f64,
    pub chart_number_masked: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingResponse {
    pub success: bool,
    pub date: String,
    pub source: &'static str,
    pub ranking: Vec<RankingEntry>,
    pub me: Option<MyRank>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A realtime score for one charted user.
#[derive(Debug, Clone)]
pub struct ScoredUser {
    pub user_id: String,
    pub chart_number: String,
    pub nickname: String,
    pub score: f64,
}

async fn active_days_by_user(
    pool: &SqlitePool,
    date: NaiveDate,
    user_id: Option<&str>,
) -> Result<HashMap<String, BTreeSet<NaiveDate>>> {
    let (start, _) = day_bounds(date - Duration::days(STREAK_LOOKBACK_DAYS));
    let (_, end) = day_bounds(date);
    let rows = sqlx::query(
        r#"
        SELECT user_id, substr(logged_at, 1, 10) AS day
        FROM health_logs
        WHERE logged_at >= ? AND logged_at <= ?
          AND (? IS NULL OR user_id = ?)
        GROUP BY user_id, day
        "#,
    )
    .bind(&start)
    .bind(&end)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut days: HashMap<String, BTreeSet<NaiveDate>> = HashMap::new();
    for row in rows {
        let day: String = row.get("day");
        if let Ok(parsed) = NaiveDate::parse_from_str(&day, "%Y-%m-%d") {
            days.entry(row.get("user_id")).or_default().insert(parsed);
        }
    }
    Ok(days)
}

/// Ranking score for one user on `date`, or `None` when nothing was logged.
pub async fn user_score_for_date(
    pool: &SqlitePool,
    user_id: &str,
    date: NaiveDate,
) -> Result<Option<f64>> {
    let (start, end) = day_bounds(date);
    let categories: Vec<String> = sqlx::query_scalar(
        "SELECT category FROM health_logs WHERE user_id = ? AND logged_at >= ? AND logged_at <= ?",
    )
    .bind(user_id)
    .bind(&start)
    .bind(&end)
    .fetch_all(pool)
    .await?;

    if categories.is_empty() {
        return Ok(None);
    }

    let mut flags = DayFlags::default();
    for c in &categories {
        flags.record(c);
    }
    let days = active_days_by_user(pool, date, Some(user_id)).await?;
    let streak = days
        .get(user_id)
        .map(|d| streak_days(d, date))
        .unwrap_or(0);
    Ok(Some(round2(ranking_score(flags, streak))))
}

/// Scores every charted user with logs on `date`, best first.
pub async fn realtime_scores(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<ScoredUser>> {
    let (start, end) = day_bounds(date);
    let rows = sqlx::query(
        r#"
        SELECT h.user_id, h.category, p.chart_number, p.nickname
        FROM health_logs h
        LEFT JOIN profiles p ON p.id = h.user_id
        WHERE h.logged_at >= ? AND h.logged_at <= ?
        "#,
    )
    .bind(&start)
    .bind(&end)
    .fetch_all(pool)
    .await?;

    let mut per_user: BTreeMap<String, (DayFlags, Option<String>, Option<String>)> =
        BTreeMap::new();
    for row in &rows {
        let user_id: String = row.get("user_id");
        let category: String = row.get("category");
        let entry = per_user
            .entry(user_id)
            .or_insert_with(|| (DayFlags::default(), row.get("chart_number"), row.get("nickname")));
        entry.0.record(&category);
    }

    if per_user.is_empty() {
        return Ok(Vec::new());
    }

    let active = active_days_by_user(pool, date, None).await?;
    let mut scores = Vec::new();
    for (user_id, (flags, chart_number, nickname)) in per_user {
        let Some(chart_number) = chart_number.filter(|c| !c.trim().is_empty()) else {
            continue;
        };
        let streak = active
            .get(&user_id)
            .map(|d| streak_days(d, date))
            .unwrap_or(0);
        scores.push(ScoredUser {
            user_id,
            chart_number,
            nickname: nickname
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NICKNAME.to_string()),
            score: ranking_score(flags, streak),
        });
    }

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(scores)
}

/// Rank of a chart number among the stored scores of `date`.
pub async fn stored_rank(
    pool: &SqlitePool,
    chart_number: &str,
    date: NaiveDate,
) -> Result<Option<MyRank>> {
    let date_str = format_date(date);
    let score: Option<f64> = sqlx::query_scalar(
        "SELECT score FROM health_scores WHERE chart_number = ? AND score_date = ?",
    )
    .bind(chart_number)
    .bind(&date_str)
    .fetch_optional(pool)
    .await?;

    let Some(score) = score else {
        return Ok(None);
    };

    let higher: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM health_scores WHERE score_date = ? AND score > ?",
    )
    .bind(&date_str)
    .bind(score)
    .fetch_one(pool)
    .await?;

    Ok(Some(MyRank {
        rank: higher as usize + 1,
        score,
        chart_number_masked: mask_chart_number(chart_number),
    }))
}

pub(crate) async fn chart_number_of(pool: &SqlitePool, user_id: &str) -> Result<Option<String>> {
    let chart: Option<Option<String>> =
        sqlx::query_scalar("SELECT chart_number FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(chart.flatten().filter(|c| !c.trim().is_empty()))
}

/// Top-10 ranking for `date` plus the caller's own position.
pub async fn daily_ranking(
    pool: &SqlitePool,
    user_id: &str,
    date: NaiveDate,
) -> Result<RankingResponse> {
    let date_str = format_date(date);
    let my_chart = chart_number_of(pool, user_id).await?;

    // Chart numbers are not unique across profiles; one row per stored score.
    let stored = sqlx::query(
        r#"
        SELECT s.chart_number, s.score,
            (SELECT p.nickname FROM profiles p
             WHERE p.chart_number = s.chart_number AND p.nickname IS NOT NULL
             ORDER BY p.updated_at DESC
             LIMIT 1) AS nickname
        FROM health_scores s
        WHERE s.score_date = ?
        ORDER BY s.score DESC
        LIMIT ?
        "#,
    )
    .bind(&date_str)
    .bind(TOP_N as i64)
    .fetch_all(pool)
    .await?;

    if !stored.is_empty() {
        let ranking = stored
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let chart: String = row.get("chart_number");
                let nickname: Option<String> = row.get("nickname");
                RankingEntry {
                    rank: i + 1,
                    chart_number_masked: mask_chart_number(&chart),
                    nickname: nickname.unwrap_or_else(|| DEFAULT_NICKNAME.to_string()),
                    score: row.get("score"),
                }
            })
            .collect();
        let me = match &my_chart {
            Some(chart) => stored_rank(pool, chart, date).await?,
            None => None,
        };
        return Ok(RankingResponse {
            success: true,
            date: date_str,
            source: "health_scores",
            ranking,
            me,
            message: None,
        });
    }

    let scores = realtime_scores(pool, date).await?;
    if scores.is_empty() {
        return Ok(RankingResponse {
            success: true,
            date: date_str,
            source: "realtime",
            ranking: Vec::new(),
            me: None,
            message: Some(EMPTY_DAY_MESSAGE.to_string()),
        });
    }

    let ranking = scores
        .iter()
        .take(TOP_N)
        .enumerate()
        .map(|(i, s)| RankingEntry {
            rank: i + 1,
            chart_number_masked: mask_chart_number(&s.chart_number),
            nickname: s.nickname.clone(),
            score: round2(s.score),
        })
        .collect();

    let me = my_chart.as_deref().and_then(|chart| {
        scores
            .iter()
            .position(|s| s.chart_number == chart)
            .map(|idx| MyRank {
                rank: idx + 1,
                score: round2(scores[idx].score),
                chart_number_masked: mask_chart_number(chart),
            })
    });

    Ok(RankingResponse {
        success: true,
        date: date_str,
        source: "realtime",
        ranking,
        me,
        message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_full_day_score() {
        let flags = DayFlags {
            medication: true,
            exercise: true,
            meal: true,
        };
        // 100 + 3·2 + 5
        assert_eq!(ranking_score(flags, 3), 111.0);
    }

    #[test]
    fn test_partial_day_score() {
        let flags = DayFlags {
            medication: true,
            exercise: false,
            meal: true,
        };
        assert!((ranking_score(flags, 1) - 72.0).abs() < 1e-9);
        assert_eq!(ranking_score(DayFlags::default(), 0), 0.0);
    }

    #[test]
    fn test_sleep_does_not_set_flags() {
        let mut flags = DayFlags::default();
        flags.record("sleep");
        assert_eq!(flags, DayFlags::default());
        flags.record("meal");
        assert!(flags.meal);
    }

    #[test]
    fn test_streak_stops_at_gap() {
        let days: BTreeSet<NaiveDate> = ["2025-05-10", "2025-05-09", "2025-05-07"]
            .iter()
            .map(|s| d(s))
            .collect();
        assert_eq!(streak_days(&days, d("2025-05-10")), 2);
        assert_eq!(streak_days(&days, d("2025-05-08")), 0);
        assert_eq!(streak_days(&days, d("2025-05-07")), 1);
    }

    #[test]
    fn test_mask_chart_number() {
        assert_eq!(mask_chart_number("D76850"), "D76***");
        assert_eq!(mask_chart_number("D768"), "D76***");
        assert_eq!(mask_chart_number("D76"), "***");
        assert_eq!(mask_chart_number(""), "***");
        assert_eq!(mask_chart_number("가나다라마"), "가나다***");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(72.0049), 72.0);
        assert_eq!(round2(1.006), 1.01);
    }
}
