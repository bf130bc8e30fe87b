//! Age bands, BMI, and fasting-window helpers.
//!
//! Pure functions; callers pass `today`/`now` explicitly so results are
//! reproducible.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    Twenties,
    Thirties,
    Forties,
    Fifties,
    Sixties,
    SeventyPlus,
}

impl AgeGroup {
    pub fn from_age(age: u32) -> Self {
        match age {
            0..=12 => Self::Child,
            13..=19 => Self::Teen,
            20..=29 => Self::Twenties,
            30..=39 => Self::Thirties,
            40..=49 => Self::Forties,
            50..=59 => Self::Fifties,
            60..=69 => Self::Sixties,
            _ => Self::SeventyPlus,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Child => "소아",
            Self::Teen => "청소년",
            Self::Twenties => "20대",
            Self::Thirties => "30대",
            Self::Forties => "40대",
            Self::Fifties => "50대",
            Self::Sixties => "60대",
            Self::SeventyPlus => "70세 이상",
        }
    }

    pub fn recommended_daily_steps(&self) -> u32 {
        match self {
            Self::Child => 12_000,
            Self::Teen | Self::Twenties | Self::Thirties => 10_000,
            Self::Forties | Self::Fifties => 8_000,
            Self::Sixties => 7_000,
            Self::SeventyPlus => 6_000,
        }
    }

    /// One-line lifestyle guide shown on the dashboard.
    pub fn health_guide(&self) -> &'static str {
        match self {
            Self::Child => "성장기에는 균형 잡힌 식사와 충분한 수면이 중요해요.",
            Self::Teen => "규칙적인 운동과 올바른 식습관으로 기초 체력을 쌓아보세요.",
            Self::Twenties => "지금 쌓는 생활 습관이 10년 후 건강을 좌우해요.",
            Self::Thirties => "스트레스 관리와 주기적인 건강검진을 권해드려요.",
            Self::Forties => "혈압·혈당 관리와 꾸준한 운동을 시작하기 좋은 시기예요.",
            Self::Fifties => "심혈관·골밀도 관리와 적정 체중 유지에 신경 써주세요.",
            Self::Sixties => "낙상 예방, 인지 활동, 정기 검진을 꾸준히 이어가세요.",
            Self::SeventyPlus => "일상 활동 유지와 약물 복용 관리에 조금 더 주의해 주세요.",
        }
    }
}

/// Completed years between `birth` and `today`; `None` outside 0..=150.
pub fn age_from_birth_date(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    if !(0..=150).contains(&age) {
        return None;
    }
    Some(age as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeartRateRange {
    pub min: u32,
    pub max: u32,
}

pub fn target_heart_rate(age: u32) -> Option<HeartRateRange> {
    if age < 10 {
        return None;
    }
    let max_hr = (220i64 - age as i64).max(60) as f64;
    Some(HeartRateRange {
        min: (max_hr * 0.5).round() as u32,
        max: (max_hr * 0.85).round() as u32,
    })
}

pub fn bmi_guidance_by_age(age: u32, bmi: f64) -> Option<&'static str> {
    if age >= 65 && (23.0..25.0).contains(&bmi) {
        return Some("65세 이상에서는 23–25 구간이 권장될 수 있습니다.");
    }
    if age >= 70 && (22.0..26.0).contains(&bmi) {
        return Some("고령에서는 적정 BMI 범위가 다를 수 있어 전문의 상담을 권합니다.");
    }
    None
}

/// Sentence injected into the assistant prompt so advice matches the age band.
pub fn age_context_for_ai(age: u32) -> String {
    format!(
        "올해 {}세({})이시므로, 연령에 맞는 건강 기준을 적용해 주세요.",
        age,
        AgeGroup::from_age(age).label()
    )
}

/// Everything the profile screen shows about a user's age.
#[derive(Debug, Clone, Serialize)]
pub struct AgeSummary {
    pub age: u32,
    pub group: AgeGroup,
    pub label: &'static str,
    pub target_heart_rate: Option<HeartRateRange>,
    pub recommended_daily_steps: u32,
    pub guide: &'static str,
    pub ai_context: String,
}

pub fn age_summary(age: u32) -> AgeSummary {
    let group = AgeGroup::from_age(age);
    AgeSummary {
        age,
        group,
        label: group.label(),
        target_heart_rate: target_heart_rate(age),
        recommended_daily_steps: group.recommended_daily_steps(),
        guide: group.health_guide(),
        ai_context: age_context_for_ai(age),
    }
}

// ============ BMI ============

/// BMI rounded to one decimal, from height in centimetres and weight in kilograms.
pub fn bmi(height_cm: Option<f64>, weight_kg: Option<f64>) -> Option<f64> {
    let (h, w) = (height_cm?, weight_kg?);
    if h <= 0.0 || w <= 0.0 {
        return None;
    }
    let meters = h / 100.0;
    Some((w / (meters * meters) * 10.0).round() / 10.0)
}

/// Asia-Pacific BMI bands.
pub fn bmi_category(bmi: f64) -> &'static str {
    if bmi < 18.5 {
        "저체중"
    } else if bmi < 23.0 {
        "정상"
    } else if bmi < 25.0 {
        "과체중"
    } else if bmi < 30.0 {
        "비만 1단계"
    } else {
        "비만 2단계"
    }
}

// ============ Fasting ============

/// Whole hours elapsed since the last meal.
pub fn fasting_hours(last_meal: Option<NaiveDateTime>, now: NaiveDateTime) -> Option<i64> {
    let last = last_meal?;
    let elapsed = now.signed_duration_since(last);
    Some(elapsed.num_seconds().div_euclid(3600).max(0))
}

pub fn fasting_message(hours: i64) -> String {
    if hours < 12 {
        format!(
            "선생님, 현재 {}시간 공복 유지 중이에요. 저속 노화를 위해 다음 식사는 언제 하실 예정인가요?",
            hours
        )
    } else if hours < 16 {
        format!(
            "선생님, {}시간 공복 유지 중이에요. 간헐적 단식 효과가 나타나고 있어요!",
            hours
        )
    } else {
        format!(
            "선생님, {}시간 공복 유지 중이에요. 장기간 공복은 전문가 상담을 권장드려요.",
            hours
        )
    }
}
