//! Core data models shared across the service.
//!
//! Rows are read with `sqlx::Row::get` and serialised to the camel- or
//! snake-cased JSON shapes the client already consumes.

use anyhow::{bail, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Storage format for wall-clock timestamps (local time, no offset).
///
/// Day-level queries compare string prefixes, so every timestamp column
/// uses this one layout.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn now_timestamp() -> String {
    Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("invalid date '{}': expected YYYY-MM-DD", input))
}

/// Accepts RFC 3339 (converted to local time), naive date-times, or a bare
/// date (midnight) and returns the canonical storage string.
pub fn normalize_timestamp(input: &str) -> Result<String> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt
            .with_timezone(&Local)
            .naive_local()
            .format(TIMESTAMP_FORMAT)
            .to_string());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(naive.format(TIMESTAMP_FORMAT).to_string());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, DATE_FORMAT) {
        return Ok(format!("{}T00:00:00", format_date(date)));
    }
    bail!("invalid timestamp: {}", input)
}

pub fn parse_timestamp(stored: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stored, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            normalize_timestamp(stored)
                .ok()
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok())
        })
}

/// Calendar day (`YYYY-MM-DD`) of a stored timestamp.
pub fn day_of(stored: &str) -> &str {
    stored.get(..10).unwrap_or(stored)
}

/// The four loggable activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Meal,
    Exercise,
    Medication,
    Sleep,
}

impl LogCategory {
    pub const ALL: [LogCategory; 4] = [
        LogCategory::Meal,
        LogCategory::Exercise,
        LogCategory::Medication,
        LogCategory::Sleep,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "meal" => Some(Self::Meal),
            "exercise" => Some(Self::Exercise),
            "medication" => Some(Self::Medication),
            "sleep" => Some(Self::Sleep),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meal => "meal",
            Self::Exercise => "exercise",
            Self::Medication => "medication",
            Self::Sleep => "sleep",
        }
    }

    /// Korean display label used in confirmation messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Meal => "식사",
            Self::Exercise => "운동",
            Self::Medication => "복약",
            Self::Sleep => "수면",
        }
    }
}

/// A stored activity log row.
#[derive(Debug, Clone, Serialize)]
pub struct HealthLog {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub note: Option<String>,
    pub logged_at: String,
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
    pub created_at: String,
}

impl HealthLog {
    pub fn from_row(row: &SqliteRow) -> Self {
        let intensity: Option<String> = row.get("intensity_metrics");
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            category: row.get("category"),
            note: row.get("note"),
            logged_at: row.get("logged_at"),
            sub_type: row.get("sub_type"),
            quantity: row.get("quantity"),
            unit: row.get("unit"),
            schedule_id: row.get("schedule_id"),
            sleep_duration_hours: row.get("sleep_duration_hours"),
            meal_description: row.get("meal_description"),
            image_url: row.get("image_url"),
            exercise_type: row.get("exercise_type"),
            duration_minutes: row.get("duration_minutes"),
            heart_rate: row.get("heart_rate"),
            intensity_metrics: intensity.and_then(|s| serde_json::from_str(&s).ok()),
            medication_name: row.get("medication_name"),
            created_at: row.get("created_at"),
        }
    }

    pub fn category(&self) -> Option<LogCategory> {
        LogCategory::parse(&self.category)
    }
}

/// A user's health profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: String,
    pub age: Option<i64>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub conditions: Option<String>,
    pub medications: Option<String>,
    pub chart_number: Option<String>,
    pub nickname: Option<String>,
}

impl Profile {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            age: row.get("age"),
            birth_date: row.get("birth_date"),
            gender: row.get("gender"),
            height: row.get("height"),
            weight: row.get("weight"),
            conditions: row.get("conditions"),
            medications: row.get("medications"),
            chart_number: row.get("chart_number"),
            nickname: row.get("nickname"),
        }
    }
}

/// One retrievable slice of a paper abstract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperChunk {
    #[serde(default)]
    pub id: String,
    pub pmid: String,
    pub title: String,
    #[serde(default)]
    pub r#abstract: Option<String>,
    #[serde(default)]
    pub citation_count: i64,
    #[serde(default)]
    pub tldr: Option<String>,
    pub chunk_text: String,
    /// Cosine similarity for vector hits, term count for keyword hits.
    #[serde(default)]
    pub similarity: f64,
}

impl PaperChunk {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            pmid: row.get("pmid"),
            title: row.get("title"),
            r#abstract: row.get("abstract"),
            citation_count: row.get("citation_count"),
            tldr: row.get("tldr"),
            chunk_text: row.get("chunk_text"),
            similarity: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_naive_and_date() {
        assert_eq!(
            normalize_timestamp("2025-03-01T08:30:00").unwrap(),
            "2025-03-01T08:30:00"
        );
        assert_eq!(
            normalize_timestamp("2025-03-01 08:30").unwrap(),
            "2025-03-01T08:30:00"
        );
        assert_eq!(
            normalize_timestamp("2025-03-01").unwrap(),
            "2025-03-01T00:00:00"
        );
        assert!(normalize_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_normalize_rfc3339_is_local() {
        let stored = normalize_timestamp("2025-03-01T08:30:00Z").unwrap();
        assert_eq!(stored.len(), 19);
        assert!(parse_timestamp(&stored).is_some());
    }

    #[test]
    fn test_category_roundtrip_and_labels() {
        for c in LogCategory::ALL {
            assert_eq!(LogCategory::parse(c.as_str()), Some(c));
        }
        assert_eq!(LogCategory::parse("cycle"), None);
        assert_eq!(LogCategory::Medication.label(), "복약");
    }

    #[test]
    fn test_day_of() {
        assert_eq!(day_of("2025-03-01T08:30:00"), "2025-03-01");
        assert_eq!(day_of("short"), "short");
    }
}
