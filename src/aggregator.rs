//! Seven-day health summary injected into the chat system prompt.
//!
//! Loading ([`aggregate`]) is kept apart from summarising ([`summarize`])
//! so the rules can be exercised without a database.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeSet, HashMap};

use crate::http::truncate_chars;
use crate::logs;
use crate::models::{day_of, format_date, HealthLog};
use crate::ranking::mask_chart_number;
use crate::schedules;

pub const DAYS: i64 = 7;
const NO_MEALS: &str = "최근 7일 식단 기록 없음.";

#[derive(Debug, Clone, Serialize)]
pub struct DaySleep {
    pub date: String,
    pub hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseEntry {
    pub date: String,
    pub kind: String,
    pub duration_minutes: Option<i64>,
    pub intensity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub start: String,
    pub end: String,
    pub sleep_daily: Vec<DaySleep>,
    pub sleep_avg_hours: Option<f64>,
    pub sleep_days: usize,
    pub exercise: Vec<ExerciseEntry>,
    pub exercise_types: Vec<String>,
    pub high_intensity_days: usize,
    pub total_meals: usize,
    pub meal_photo_days: usize,
    pub meal_summary: String,
    pub medication_days: usize,
    pub medication_total: usize,
    pub expected_meds_per_day: Option<i64>,
    pub today_score: Option<f64>,
    pub today_rank: Option<usize>,
    pub score_week_ago: Option<f64>,
    pub trend: Option<Trend>,
    pub chart_number_masked: Option<String>,
}

/// Score rows the summary needs, already filtered to the window.
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs {
    pub chart_number: Option<String>,
    /// This user's scores by `YYYY-MM-DD`.
    pub own_scores: HashMap<String, f64>,
    /// Every chart number scored today, best first.
    pub today_board: Vec<String>,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn intensity_of(log: &HealthLog) -> Option<String> {
    let metrics = log.intensity_metrics.as_ref();
    let level = metrics
        .and_then(|m| m.get("level").or_else(|| m.get("intensity")))
        .and_then(|v| v.as_str())
        .map(String::from);
    level
        .or_else(|| log.heart_rate.map(|hr| format!("심박 {}", hr)))
        .or_else(|| log.duration_minutes.map(|d| format!("{}분", d)))
}

pub fn summarize(
    logs: &[HealthLog],
    expected_meds_per_day: Option<i64>,
    scores: &ScoreInputs,
    today: NaiveDate,
) -> HealthSummary {
    let start = today - Duration::days(DAYS - 1);
    let start_str = format_date(start);
    let end_str = format_date(today);

    let mut sleep_daily = Vec::new();
    let mut sleep_total = 0.0;
    let mut sleep_days = 0usize;
    let mut exercise = Vec::new();
    let mut exercise_types: Vec<String> = Vec::new();
    let mut high_intensity = BTreeSet::new();
    let mut total_meals = 0usize;
    let mut meal_photo_days = 0usize;
    let mut meal_lines = Vec::new();
    let mut medication_days = 0usize;
    let mut medication_total = 0usize;

    for offset in 0..DAYS {
        let date = format_date(start + Duration::days(offset));
        let day: Vec<&HealthLog> = logs.iter().filter(|l| day_of(&l.logged_at) == date).collect();
        let of = |cat: &'static str| day.iter().copied().filter(move |l| l.category == cat);

        let sleeps: Vec<f64> = of("sleep").map(|l| l.sleep_duration_hours.unwrap_or(0.0)).collect();
        let hours = if sleeps.is_empty() {
            None
        } else {
            Some(sleeps.iter().sum::<f64>() / sleeps.len() as f64)
        };
        if let Some(h) = hours {
            sleep_total += h;
            sleep_days += 1;
        }
        sleep_daily.push(DaySleep {
            date: date.clone(),
            hours: hours.map(round1),
        });

        for log in of("exercise") {
            let kind = log
                .exercise_type
                .clone()
                .or_else(|| log.sub_type.clone())
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| "기록됨".to_string());
            if !exercise_types.contains(&kind) {
                exercise_types.push(kind.clone());
            }
            let intensity = intensity_of(log);
            let is_high = intensity
                .as_deref()
                .is_some_and(|i| i.contains("고강도") || i.contains("high"))
                || log.heart_rate.is_some_and(|hr| hr >= 160);
            if is_high {
                high_intensity.insert(date.clone());
            }
            exercise.push(ExerciseEntry {
                date: date.clone(),
                kind,
                duration_minutes: log.duration_minutes,
                intensity,
            });
        }

        let meals: Vec<String> = of("meal")
            .map(|l| {
                let text = l
                    .meal_description
                    .as_deref()
                    .or(l.note.as_deref())
                    .unwrap_or("식사 기록");
                truncate_chars(text, 200).to_string()
            })
            .collect();
        if of("meal").any(|l| l.image_url.as_deref().is_some_and(|u| !u.is_empty())) {
            meal_photo_days += 1;
        }
        total_meals += meals.len();
        if !meals.is_empty() {
            meal_lines.push(format!("{}: {}", date, meals.join(", ")));
        }

        let meds = of("medication").count();
        medication_total += meds;
        if meds > 0 {
            medication_days += 1;
        }
    }

    let meal_summary = if meal_lines.is_empty() {
        NO_MEALS.to_string()
    } else {
        truncate_chars(&meal_lines.join(" | "), 1500).to_string()
    };

    let chart = scores.chart_number.as_deref();
    let today_score = scores.own_scores.get(&end_str).copied();
    let today_rank = chart.and_then(|c| scores.today_board.iter().position(|b| b == c).map(|i| i + 1));
    let score_week_ago = scores.own_scores.get(&start_str).copied();
    let trend = match (today_score, score_week_ago) {
        (Some(now), Some(then)) if now > then => Some(Trend::Up),
        (Some(now), Some(then)) if now < then => Some(Trend::Down),
        (Some(_), Some(_)) => Some(Trend::Stable),
        _ => None,
    };

    HealthSummary {
        start: start_str,
        end: end_str,
        sleep_daily,
        sleep_avg_hours: (sleep_days > 0).then(|| round1(sleep_total / sleep_days as f64)),
        sleep_days,
        exercise,
        exercise_types,
        high_intensity_days: high_intensity.len(),
        total_meals,
        meal_photo_days,
        meal_summary,
        medication_days,
        medication_total,
        expected_meds_per_day: expected_meds_per_day.filter(|n| *n > 0),
        today_score,
        today_rank,
        score_week_ago,
        trend,
        chart_number_masked: chart.map(mask_chart_number),
    }
}

pub async fn aggregate(pool: &SqlitePool, user_id: &str, today: NaiveDate) -> Result<HealthSummary> {
    let start = today - Duration::days(DAYS - 1);
    let logs = logs::logs_between(pool, user_id, start, today).await?;
    let expected = schedules::active_medication_count(pool, user_id).await?;

    let chart_number: Option<Option<String>> =
        sqlx::query_scalar("SELECT chart_number FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    let chart_number = chart_number.flatten().filter(|c| !c.trim().is_empty());

    let mut inputs = ScoreInputs {
        chart_number: chart_number.clone(),
        ..Default::default()
    };
    if let Some(chart) = &chart_number {
        let rows = sqlx::query(
            "SELECT score_date, score FROM health_scores \
             WHERE chart_number = ? AND score_date >= ? AND score_date <= ?",
        )
        .bind(chart)
        .bind(format_date(start))
        .bind(format_date(today))
        .fetch_all(pool)
        .await?;
        inputs.own_scores = rows
            .iter()
            .map(|r| (r.get::<String, _>("score_date"), r.get::<f64, _>("score")))
            .collect();

        inputs.today_board = sqlx::query_scalar(
            "SELECT chart_number FROM health_scores WHERE score_date = ? ORDER BY score DESC",
        )
        .bind(format_date(today))
        .fetch_all(pool)
        .await?;
    }

    Ok(summarize(&logs, Some(expected), &inputs, today))
}

pub fn format_for_prompt(s: &HealthSummary) -> String {
    let mut lines = vec![format!("[집계 기간: {} ~ {}]", s.start, s.end)];

    match s.sleep_avg_hours {
        Some(avg) => {
            lines.push(format!(
                "- 수면: 7일 중 {}일 기록, 일평균 약 {}시간",
                s.sleep_days, avg
            ));
            let short: Vec<&str> = s
                .sleep_daily
                .iter()
                .filter(|d| d.hours.is_some_and(|h| h < 6.0))
                .map(|d| d.date.as_str())
                .collect();
            if !short.is_empty() {
                lines.push(format!("  - 6시간 미만 수면일: {}", short.join(", ")));
            }
        }
        None => lines.push("- 수면: 최근 7일 수면 기록 없음".to_string()),
    }

    if s.exercise.is_empty() {
        lines.push("- 운동: 최근 7일 운동 기록 없음".to_string());
    } else {
        lines.push(format!(
            "- 운동: 총 {}회 (종류: {})",
            s.exercise.len(),
            s.exercise_types.join(", ")
        ));
        if s.high_intensity_days > 0 {
            lines.push(format!("  - 고강도 운동 기록일: {}일", s.high_intensity_days));
        }
        let skip = s.exercise.len().saturating_sub(5);
        for e in &s.exercise[skip..] {
            let mut parts = vec![e.date.clone(), e.kind.clone()];
            if let Some(d) = e.duration_minutes {
                parts.push(format!("{}분", d));
            }
            if let Some(i) = &e.intensity {
                parts.push(i.clone());
            }
            lines.push(format!("  - {}", parts.join(" ")));
        }
    }

    lines.push(format!(
        "- 식단: 총 {}회 식사 기록, 사진 {}일분",
        s.total_meals, s.meal_photo_days
    ));
    if s.meal_summary != NO_MEALS {
        let head = truncate_chars(&s.meal_summary, 500);
        let ellipsis = if head.len() < s.meal_summary.len() { "…" } else { "" };
        lines.push(format!("  요약: {}{}", head, ellipsis));
    }

    lines.push(format!(
        "- 복약: 7일 중 {}일 기록, 총 {}회",
        s.medication_days, s.medication_total
    ));
    if let Some(expected) = s.expected_meds_per_day {
        lines.push(format!("  - 스케줄 기준 예상 일일 복약 수: {}", expected));
    }

    if let Some(score) = s.today_score {
        let rank = s
            .today_rank
            .map(|r| format!(", 현재 랭킹 약 {}위", r))
            .unwrap_or_default();
        let trend = match s.trend {
            Some(Trend::Up) => " (7일 전 대비 상승)",
            Some(Trend::Down) => " (7일 전 대비 하락)",
            _ => "",
        };
        lines.push(format!("- 랭킹/점수: 오늘 {}점{}{}", score, rank, trend));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(category: &str, logged_at: &str) -> HealthLog {
        HealthLog {
            id: String::new(),
            user_id: "u".into(),
            category: category.into(),
            note: None,
            logged_at: logged_at.into(),
            sub_type: None,
            quantity: None,
            unit: None,
            schedule_id: None,
            sleep_duration_hours: None,
            meal_description: None,
            image_url: None,
            exercise_type: None,
            duration_minutes: None,
            heart_rate: None,
            intensity_metrics: None,
            medication_name: None,
            created_at: logged_at.into(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn test_empty_week() {
        let s = summarize(&[], Some(0), &ScoreInputs::default(), today());
        assert_eq!(s.start, "2025-03-04");
        let text = format_for_prompt(&s);
        assert_eq!(
            text,
            "[집계 기간: 2025-03-04 ~ 2025-03-10]\n\
             - 수면: 최근 7일 수면 기록 없음\n\
             - 운동: 최근 7일 운동 기록 없음\n\
             - 식단: 총 0회 식사 기록, 사진 0일분\n\
             - 복약: 7일 중 0일 기록, 총 0회"
        );
    }

    #[test]
    fn test_sleep_exercise_meals() {
        let mut sleep1 = log("sleep", "2025-03-09T07:00:00");
        sleep1.sleep_duration_hours = Some(5.0);
        let mut sleep2 = log("sleep", "2025-03-10T07:00:00");
        sleep2.sleep_duration_hours = Some(8.0);
        let mut run = log("exercise", "2025-03-10T18:00:00");
        run.exercise_type = Some("러닝".into());
        run.duration_minutes = Some(30);
        run.heart_rate = Some(165);
        let mut lunch = log("meal", "2025-03-10T12:00:00");
        lunch.meal_description = Some("비빔밥".into());
        lunch.image_url = Some("https://img/1.jpg".into());
        let old = log("meal", "2025-03-01T12:00:00");
        let med = log("medication", "2025-03-10T09:00:00");

        let logs = vec![sleep1, sleep2, run, lunch, old, med];
        let s = summarize(&logs, Some(2), &ScoreInputs::default(), today());
        assert_eq!(s.sleep_days, 2);
        assert_eq!(s.sleep_avg_hours, Some(6.5));
        assert_eq!(s.high_intensity_days, 1);
        assert_eq!(s.total_meals, 1);
        assert_eq!(s.meal_photo_days, 1);
        assert_eq!(s.meal_summary, "2025-03-10: 비빔밥");

        let text = format_for_prompt(&s);
        assert!(text.contains("- 수면: 7일 중 2일 기록, 일평균 약 6.5시간"));
        assert!(text.contains("  - 6시간 미만 수면일: 2025-03-09"));
        assert!(text.contains("- 운동: 총 1회 (종류: 러닝)"));
        assert!(text.contains("  - 2025-03-10 러닝 30분 심박 165"));
        assert!(text.contains("  요약: 2025-03-10: 비빔밥"));
        assert!(text.contains("- 복약: 7일 중 1일 기록, 총 1회"));
        assert!(text.contains("  - 스케줄 기준 예상 일일 복약 수: 2"));
    }

    #[test]
    fn test_ranking_trend() {
        let mut own = HashMap::new();
        own.insert("2025-03-10".to_string(), 42.5);
        own.insert("2025-03-04".to_string(), 30.0);
        let inputs = ScoreInputs {
            chart_number: Some("A1234".into()),
            own_scores: own,
            today_board: vec!["B9".into(), "A1234".into()],
        };
        let s = summarize(&[], None, &inputs, today());
        assert_eq!(s.today_rank, Some(2));
        assert_eq!(s.trend, Some(Trend::Up));
        assert_eq!(s.chart_number_masked.as_deref(), Some("A12***"));
        assert!(format_for_prompt(&s).ends_with("- 랭킹/점수: 오늘 42.5점, 현재 랭킹 약 2위 (7일 전 대비 상승)"));
    }
}
