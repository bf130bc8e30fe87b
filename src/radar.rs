//! Five-axis health radar derived from a profile.
//!
//! Axes start from a neutral baseline and are adjusted by condition
//! keywords, BMI band, and age. Each axis is clamped to `0..=100`.

use serde::Serialize;

use crate::models::Profile;

const BASELINE: i32 = 80;
const ACTIVITY_BASELINE: i32 = 70;
const DEFAULT_BMI: f64 = 22.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadarScores {
    pub cardiovascular: i32,
    pub musculoskeletal: i32,
    pub nutrition: i32,
    pub metabolism: i32,
    pub activity: i32,
    pub overall: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RadarAxis {
    pub subject: &'static str,
    pub score: i32,
    pub band: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RadarReport {
    pub scores: RadarScores,
    pub axes: Vec<RadarAxis>,
    pub overall_band: &'static str,
    pub bmi: Option<f64>,
}

/// Inputs the radar needs, decoupled from the stored profile shape.
#[derive(Debug, Clone, Default)]
pub struct RadarInput<'a> {
    pub age: Option<u32>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub conditions: Option<&'a str>,
}

impl<'a> From<&'a Profile> for RadarInput<'a> {
    fn from(p: &'a Profile) -> Self {
        Self {
            age: p.age.and_then(|a| u32::try_from(a).ok()),
            height_cm: p.height,
            weight_kg: p.weight,
            conditions: p.conditions.as_deref(),
        }
    }
}

pub fn score_band(score: i32) -> &'static str {
    match score {
        s if s >= 80 => "good",
        s if s >= 60 => "fair",
        s if s >= 40 => "caution",
        _ => "poor",
    }
}

fn raw_bmi(input: &RadarInput) -> f64 {
    match (input.height_cm, input.weight_kg) {
        (Some(h), Some(w)) if h > 0.0 && w > 0.0 => w / (h / 100.0).powi(2),
        _ => DEFAULT_BMI,
    }
}

pub fn calculate(input: &RadarInput) -> RadarScores {
    let bmi = raw_bmi(input);
    let age = input.age.unwrap_or(0);
    let conditions = input.conditions.unwrap_or("").to_lowercase();
    let has = |kw: &str| conditions.contains(kw);

    let mut cardiovascular = BASELINE;
    if has("고혈압") {
        cardiovascular -= 25;
    }
    if has("심장") || has("심근") {
        cardiovascular -= 30;
    }
    if has("부정맥") {
        cardiovascular -= 20;
    }
    if has("고지혈") || has("콜레스테롤") {
        cardiovascular -= 15;
    }
    cardiovascular -= if bmi >= 30.0 {
        20
    } else if bmi >= 27.0 {
        12
    } else if bmi >= 25.0 {
        8
    } else {
        0
    };
    cardiovascular -= if age >= 60 {
        10
    } else if age >= 50 {
        5
    } else {
        0
    };

    let mut musculoskeletal = BASELINE;
    if has("관절") {
        musculoskeletal -= 25;
    }
    if has("허리") || has("디스크") {
        musculoskeletal -= 20;
    }
    if has("골다공증") {
        musculoskeletal -= 25;
    }
    if has("류마티스") {
        musculoskeletal -= 20;
    }
    musculoskeletal -= if bmi >= 30.0 {
        20
    } else if bmi >= 27.0 {
        15
    } else if bmi >= 25.0 {
        10
    } else {
        0
    };
    musculoskeletal -= if age >= 60 {
        15
    } else if age >= 50 {
        8
    } else {
        0
    };

    let mut nutrition = BASELINE;
    if bmi < 18.5 {
        nutrition -= 20;
    }
    nutrition -= if bmi >= 30.0 {
        15
    } else if bmi >= 25.0 {
        8
    } else {
        0
    };
    if has("당뇨") {
        nutrition -= 10;
    }

    let mut metabolism = BASELINE;
    metabolism += if bmi < 18.5 {
        -15
    } else if bmi >= 30.0 {
        -30
    } else if bmi >= 27.0 {
        -20
    } else if bmi >= 25.0 {
        -12
    } else if bmi < 23.0 {
        10
    } else {
        0
    };
    if has("당뇨") {
        metabolism -= 25;
    }
    if has("갑상선") {
        metabolism -= 15;
    }
    metabolism -= if age >= 60 {
        15
    } else if age >= 50 {
        10
    } else if age >= 40 {
        5
    } else {
        0
    };

    let mut activity = ACTIVITY_BASELINE;
    if (18.5..23.0).contains(&bmi) {
        activity += 15;
    } else if bmi >= 25.0 {
        activity -= 15;
    }
    if has("관절") || has("허리") {
        activity -= 15;
    }
    activity -= if age >= 70 {
        20
    } else if age >= 60 {
        10
    } else {
        0
    };

    let clamp = |v: i32| v.clamp(0, 100);
    let (cv, ms, nu, me, ac) = (
        clamp(cardiovascular),
        clamp(musculoskeletal),
        clamp(nutrition),
        clamp(metabolism),
        clamp(activity),
    );
    let overall = (cv as f64 * 0.25
        + ms as f64 * 0.2
        + nu as f64 * 0.2
        + me as f64 * 0.2
        + ac as f64 * 0.15)
        .round() as i32;

    RadarScores {
        cardiovascular: cv,
        musculoskeletal: ms,
        nutrition: nu,
        metabolism: me,
        activity: ac,
        overall,
    }
}

pub fn report(input: &RadarInput) -> RadarReport {
    let scores = calculate(input);
    let axes = [
        ("심혈관", scores.cardiovascular),
        ("근골격", scores.musculoskeletal),
        ("영양", scores.nutrition),
        ("대사", scores.metabolism),
        ("활동량", scores.activity),
    ]
    .into_iter()
    .map(|(subject, score)| RadarAxis {
        subject,
        score,
        band: score_band(score),
    })
    .collect();

    RadarReport {
        scores,
        axes,
        overall_band: score_band(scores.overall),
        bmi: crate::health::bmi(input.height_cm, input.weight_kg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_profile_uses_default_bmi() {
        let s = calculate(&RadarInput::default());
        // BMI 22: metabolism bonus, activity bonus
        assert_eq!(s.cardiovascular, 80);
        assert_eq!(s.musculoskeletal, 80);
        assert_eq!(s.nutrition, 80);
        assert_eq!(s.metabolism, 90);
        assert_eq!(s.activity, 85);
        // 20 + 16 + 16 + 18 + 12.75 = 82.75
        assert_eq!(s.overall, 83);
    }

    #[test]
    fn test_conditions_and_age_deduct() {
        let input = RadarInput {
            age: Some(62),
            height_cm: Some(170.0),
            weight_kg: Some(90.0), // BMI ≈ 31.1
            conditions: Some("고혈압, 당뇨, 허리 디스크"),
        };
        let s = calculate(&input);
        assert_eq!(s.cardiovascular, 80 - 25 - 20 - 10);
        assert_eq!(s.musculoskeletal, 80 - 20 - 20 - 15);
        assert_eq!(s.nutrition, 80 - 15 - 10);
        assert_eq!(s.metabolism, 80 - 30 - 25 - 15);
        assert_eq!(s.activity, 70 - 15 - 15 - 10);
    }

    #[test]
    fn test_scores_clamped_to_zero() {
        let input = RadarInput {
            age: Some(80),
            height_cm: Some(160.0),
            weight_kg: Some(120.0),
            conditions: Some("심장 심근 고혈압 부정맥 고지혈"),
        };
        let s = calculate(&input);
        assert_eq!(s.cardiovascular, 0);
    }

    #[test]
    fn test_underweight_hits_nutrition_and_metabolism() {
        let input = RadarInput {
            age: Some(30),
            height_cm: Some(180.0),
            weight_kg: Some(55.0), // BMI ≈ 17
            conditions: None,
        };
        let s = calculate(&input);
        assert_eq!(s.nutrition, 60);
        assert_eq!(s.metabolism, 65);
        assert_eq!(s.activity, 70);
    }

    #[test]
    fn test_bands_and_report_axes() {
        assert_eq!(score_band(80), "good");
        assert_eq!(score_band(60), "fair");
        assert_eq!(score_band(40), "caution");
        assert_eq!(score_band(39), "poor");

        let r = report(&RadarInput::default());
        assert_eq!(r.axes.len(), 5);
        assert_eq!(r.axes[0].subject, "심혈관");
        assert_eq!(r.bmi, None);
    }
}
