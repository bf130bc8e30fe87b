//! Health profile storage.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::health::age_from_birth_date;
use crate::models::{format_date, now_timestamp, parse_date, Profile};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
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

pub async fn get_profile(pool: &SqlitePool, user_id: &str) -> Result<Option<Profile>> {
    let row = sqlx::query("SELECT * FROM profiles WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(Profile::from_row))
}

/// Inserts or replaces the caller's profile. A valid `birth_date` takes
/// precedence over any `age` in the input.
pub async fn upsert_profile(
    pool: &SqlitePool,
    user_id: &str,
    input: &ProfileInput,
    today: NaiveDate,
) -> Result<Profile> {
    let birth = input
        .birth_date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_date)
        .transpose()?;
    let age = birth
        .and_then(|b| age_from_birth_date(b, today))
        .map(i64::from)
        .or(input.age);

    sqlx::query(
        r#"
        INSERT INTO profiles (
            id, age, birth_date, gender, height, weight, conditions, medications,
            chart_number, nickname, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            age = excluded.age,
            birth_date = excluded.birth_date,
            gender = excluded.gender,
            height = excluded.height,
            weight = excluded.weight,
            conditions = excluded.conditions,
            medications = excluded.medications,
            chart_number = COALESCE(excluded.chart_number, profiles.chart_number),
            nickname = COALESCE(excluded.nickname, profiles.nickname),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(age)
    .bind(birth.map(format_date))
    .bind(&input.gender)
    .bind(input.height)
    .bind(input.weight)
    .bind(&input.conditions)
    .bind(&input.medications)
    .bind(&input.chart_number)
    .bind(&input.nickname)
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    get_profile(pool, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile {} not found after upsert", user_id))
}

/// Age used for advice: derived from `birth_date` when it parses, else the
/// stored `age`.
pub fn effective_age(profile: &Profile, today: NaiveDate) -> Option<u32> {
    profile
        .birth_date
        .as_deref()
        .and_then(|b| parse_date(b).ok())
        .and_then(|b| age_from_birth_date(b, today))
        .or_else(|| profile.age.and_then(|a| u32::try_from(a).ok()))
}

fn age_band_hint(age: u32) -> Option<&'static str> {
    match age {
        20..=39 => Some("2030 → 간편·트렌디 식단(포케, 요거트 등) 우선"),
        40..=59 => Some("4050 → 정갈한 한식(구이, 나물 등) 우선"),
        60.. => Some("6070 → 소화 용이·부드러운 식감(찜, 죽, 국 등) 우선"),
        _ => None,
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Profile section of the assistant's system prompt, heading included.
pub fn format_for_prompt(profile: Option<&Profile>, today: NaiveDate) -> String {
    let Some(p) = profile else {
        return "## 건강 프로필\n아직 등록된 건강 프로필이 없습니다.\n".to_string();
    };

    let mut out = String::from("## 현재 상담 중인 선생님의 건강 프로필 (생년월일 기반 연령 맞춤화)\n");
    if let Some(age) = effective_age(p, today) {
        out.push_str(&format!(
            "- **만 나이**: {}세 (대화 흐름·연령별 영양 추천에 반영)\n",
            age
        ));
        if let Some(hint) = age_band_hint(age) {
            out.push_str(&format!("- 연령대: {}\n", hint));
        }
        out.push_str(&format!("- {}\n", crate::health::age_context_for_ai(age)));
    }
    if let Some(gender) = non_empty(&p.gender) {
        let label = if gender == "male" { "남성" } else { "여성" };
        out.push_str(&format!("- 성별: {}\n", label));
    }
    if let (Some(h), Some(w)) = (p.height, p.weight) {
        out.push_str(&format!("- 신체: {}cm / {}kg\n", h, w));
        if let Some(bmi) = crate::health::bmi(Some(h), Some(w)) {
            out.push_str(&format!(
                "- BMI: {} ({})\n",
                bmi,
                crate::health::bmi_category(bmi)
            ));
        }
    }
    if let Some(c) = non_empty(&p.conditions) {
        out.push_str(&format!("- 기저 질환: {}\n", c));
    }
    if let Some(m) = non_empty(&p.medications) {
        out.push_str(&format!("- 복용 약물: {}\n", m));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn test_prompt_without_profile() {
        assert_eq!(
            format_for_prompt(None, today()),
            "## 건강 프로필\n아직 등록된 건강 프로필이 없습니다.\n"
        );
    }

    #[test]
    fn test_prompt_with_profile() {
        let p = Profile {
            age: Some(99),
            birth_date: Some("1973-05-10".to_string()),
            gender: Some("female".to_string()),
            height: Some(170.0),
            weight: Some(65.0),
            conditions: Some("고혈압".to_string()),
            ..Default::default()
        };
        let text = format_for_prompt(Some(&p), today());
        assert!(text.contains("- **만 나이**: 52세"));
        assert!(text.contains("- 연령대: 4050"));
        assert!(text.contains("- 성별: 여성"));
        assert!(text.contains("- 신체: 170cm / 65kg"));
        assert!(text.contains("- BMI: 22.5 (정상)"));
        assert!(text.contains("- 기저 질환: 고혈압"));
        assert!(!text.contains("복용 약물"));
    }

    #[test]
    fn test_effective_age_falls_back_to_stored_age() {
        let p = Profile {
            age: Some(31),
            birth_date: Some("not a date".to_string()),
            ..Default::default()
        };
        assert_eq!(effective_age(&p, today()), Some(31));
    }
}
