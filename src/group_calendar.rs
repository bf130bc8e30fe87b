//! Shared calendars for care groups.
//!
//! Members of a group are identified by chart number. The calendar shows,
//! per day, whether anyone (or one member) logged a meal, exercise or
//! medication. Only those presence flags leave this module; values such
//! as weight, heart rate or notes are never read.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{day_of, now_timestamp, parse_date};
use crate::ranking::{chart_number_of, day_bounds, DayFlags, DEFAULT_NICKNAME};

pub const OWN_NICKNAME: &str = "나";
/// Consecutive medication days before the comment calls out the streak.
const STREAK_CALLOUT_DAYS: u32 = 3;

pub type CalendarDays = BTreeMap<String, DayFlags>;

#[derive(Debug, Clone, Serialize)]
pub struct GroupCalendar {
    pub success: bool,
    pub days: CalendarDays,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCalendar {
    pub success: bool,
    pub days: CalendarDays,
    pub ai_comment: String,
    pub nickname: String,
    pub is_own: bool,
}

/// Why a calendar lookup was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    NoChartNumber,
    GroupNotFound,
    MemberNotFound,
    NotGroupMember,
    NotSameGroup,
}

impl Denied {
    pub fn message(self) -> &'static str {
        match self {
            Denied::NoChartNumber => "차트 번호가 없습니다.",
            Denied::GroupNotFound => "그룹을 찾을 수 없습니다.",
            Denied::MemberNotFound => "멤버를 찾을 수 없습니다.",
            Denied::NotGroupMember => "그룹 멤버만 조회할 수 있습니다.",
            Denied::NotSameGroup => "같은 그룹에 속한 멤버만 조회할 수 있습니다.",
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, Denied::GroupNotFound | Denied::MemberNotFound)
    }
}

/// Folds `(day, category)` rows into per-day flags. Rows whose category
/// is not meal, exercise or medication are ignored.
pub fn aggregate_days<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> CalendarDays {
    let mut days = CalendarDays::new();
    for (logged_at, category) in rows {
        let day = day_of(logged_at);
        if day.is_empty() {
            continue;
        }
        let mut flags = days.get(day).copied().unwrap_or_default();
        flags.record(category);
        if flags != DayFlags::default() {
            days.insert(day.to_string(), flags);
        }
    }
    days
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    meal: u32,
    exercise: u32,
    medication: u32,
    longest_medication_streak: u32,
}

fn tally(days: &CalendarDays) -> Tally {
    let mut t = Tally::default();
    let mut streak = 0;
    let mut prev: Option<NaiveDate> = None;
    for (day, flags) in days {
        t.meal += flags.meal as u32;
        t.exercise += flags.exercise as u32;
        if !flags.medication {
            streak = 0;
            continue;
        }
        t.medication += 1;
        let date = parse_date(day).ok();
        let follows = matches!((prev, date), (Some(p), Some(d)) if d - p == Duration::days(1));
        streak = if follows { streak + 1 } else { 1 };
        prev = date;
        t.longest_medication_streak = t.longest_medication_streak.max(streak);
    }
    t
}

/// One-line group summary with day counts only.
pub fn group_summary(days: &CalendarDays) -> String {
    if days.is_empty() {
        return "아직 그룹 활동 기록이 없어요. 첫 기록을 남겨보세요.".to_string();
    }
    let t = tally(days);
    let parts: Vec<String> = [("식단", t.meal), ("운동", t.exercise), ("복약", t.medication)]
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(label, n)| format!("{} {}일", label, n))
        .collect();
    if parts.is_empty() {
        return "이번 기간에는 활동 기록이 없었어요.".to_string();
    }
    format!(
        "이번 기간 그룹은 {} 기록했어요. 함께 꾸준히 챙기고 있어요.",
        parts.join(", ")
    )
}

/// Encouraging comment for one member's calendar.
pub fn member_comment(nickname: &str, days: &CalendarDays, is_own: bool) -> String {
    if days.is_empty() {
        return if is_own {
            "아직 건강 기록이 없어요. 첫 기록을 남겨보세요!".to_string()
        } else {
            format!("{}님의 건강 기록이 아직 없어요.", nickname)
        };
    }

    let t = tally(days);
    let mut parts = Vec::new();
    if t.longest_medication_streak >= STREAK_CALLOUT_DAYS {
        let honorific = if is_own { "께서" } else { "님께서" };
        parts.push(format!(
            "{}{} {}일 연속 복약을 잊지 않으셨어요!",
            nickname, honorific, t.longest_medication_streak
        ));
    } else if t.medication > 0 {
        parts.push("복약을 꾸준히 챙기고 계세요.".to_string());
    }
    if t.exercise > 0 {
        parts.push(format!("운동도 {}일 기록하셨어요.", t.exercise));
    }
    if t.meal > 0 {
        parts.push(format!("식단 기록도 {}일 하셨어요.", t.meal));
    }
    if parts.is_empty() {
        return "이번 기간에는 활동 기록이 없었어요.".to_string();
    }
    format!(
        "{} 작은 습관이 모여 더 건강한 일상을 만들어 가고 있어요.",
        parts.join(" ")
    )
}

/// Creates a group with the given member chart numbers. Returns its id.
pub async fn create_group(pool: &SqlitePool, name: &str, chart_numbers: &[&str]) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO user_groups (id, name, created_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    for chart in chart_numbers {
        sqlx::query(
            "INSERT OR IGNORE INTO group_members (group_id, chart_number, joined_at) VALUES (?, ?, ?)",
        )
        .bind(&id)
        .bind(chart.trim())
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    tracing::info!(group_id = %id, members = chart_numbers.len(), "group created");
    Ok(id)
}

async fn is_member(pool: &SqlitePool, group_id: &str, chart: &str) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM group_members WHERE group_id = ? AND chart_number = ?")
            .bind(group_id)
            .bind(chart)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn share_a_group(pool: &SqlitePool, a: &str, b: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1
        FROM group_members x
        JOIN group_members y ON y.group_id = x.group_id
        WHERE x.chart_number = ? AND y.chart_number = ?
        LIMIT 1
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

fn collect_days(rows: &[sqlx::sqlite::SqliteRow]) -> CalendarDays {
    let pairs: Vec<(String, String)> = rows
        .iter()
        .map(|row| (row.get("logged_at"), row.get("category")))
        .collect();
    aggregate_days(pairs.iter().map(|(d, c)| (d.as_str(), c.as_str())))
}

/// Activity flags for every member of `group_id` between `start` and
/// `end` inclusive. The caller must belong to the group.
pub async fn group_calendar(
    pool: &SqlitePool,
    user_id: &str,
    group_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Result<GroupCalendar, Denied>> {
    let Some(my_chart) = chart_number_of(pool, user_id).await? else {
        return Ok(Err(Denied::NoChartNumber));
    };
    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM user_groups WHERE id = ?")
        .bind(group_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Ok(Err(Denied::GroupNotFound));
    }
    if !is_member(pool, group_id, &my_chart).await? {
        return Ok(Err(Denied::NotGroupMember));
    }

    let (from, _) = day_bounds(start);
    let (_, to) = day_bounds(end);
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT substr(h.logged_at, 1, 10) AS logged_at, h.category
        FROM health_logs h
        JOIN profiles p ON p.id = h.user_id
        JOIN group_members m ON m.chart_number = p.chart_number
        WHERE m.group_id = ?
          AND h.logged_at >= ? AND h.logged_at <= ?
          AND h.category IN ('meal', 'exercise', 'medication')
        "#,
    )
    .bind(group_id)
    .bind(&from)
    .bind(&to)
    .fetch_all(pool)
    .await?;

    let days = collect_days(&rows);
    let summary = group_summary(&days);
    Ok(Ok(GroupCalendar {
        success: true,
        days,
        summary,
    }))
}

/// Activity flags for the member holding `member_chart`. Callers may view
/// their own calendar, or that of someone sharing a group with them.
pub async fn member_calendar(
    pool: &SqlitePool,
    user_id: &str,
    member_chart: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Result<MemberCalendar, Denied>> {
    let Some(my_chart) = chart_number_of(pool, user_id).await? else {
        return Ok(Err(Denied::NoChartNumber));
    };
    let member_chart = member_chart.trim();

    let profiles = sqlx::query(
        "SELECT nickname FROM profiles WHERE chart_number = ? ORDER BY updated_at DESC",
    )
    .bind(member_chart)
    .fetch_all(pool)
    .await?;
    if profiles.is_empty() {
        return Ok(Err(Denied::MemberNotFound));
    }

    let is_own = my_chart == member_chart;
    if !is_own && !share_a_group(pool, &my_chart, member_chart).await? {
        return Ok(Err(Denied::NotSameGroup));
    }

    let (from, _) = day_bounds(start);
    let (_, to) = day_bounds(end);
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT substr(h.logged_at, 1, 10) AS logged_at, h.category
        FROM health_logs h
        JOIN profiles p ON p.id = h.user_id
        WHERE p.chart_number = ?
          AND h.logged_at >= ? AND h.logged_at <= ?
          AND h.category IN ('meal', 'exercise', 'medication')
        "#,
    )
    .bind(member_chart)
    .bind(&from)
    .bind(&to)
    .fetch_all(pool)
    .await?;

    let nickname = profiles
        .iter()
        .filter_map(|row| row.get::<Option<String>, _>("nickname"))
        .find(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            if is_own {
                OWN_NICKNAME.to_string()
            } else {
                DEFAULT_NICKNAME.to_string()
            }
        });
    let days = collect_days(&rows);
    let ai_comment = member_comment(&nickname, &days, is_own);
    Ok(Ok(MemberCalendar {
        success: true,
        days,
        ai_comment,
        nickname,
        is_own,
    }))
}
