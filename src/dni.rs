//! Drug–nutrient interaction (DNI) inference.
//!
//! A user's active medications resolve to active ingredients through the
//! drug master table. Each ingredient may carry `dni_logic` rules naming a
//! nutrient to watch. A rule fires when the food data (per 100 g) contains
//! that nutrient. The resulting guide is advisory and never diagnostic.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::usda::FoodNutrients;

/// Nutrient key, the names a rule may use for it, and its display unit.
const NUTRIENT_LABELS: &[(&str, &[&str], &str)] = &[
    ("potassium_mg", &["칼륨", "포타슘", "potassium"], "mg"),
    ("sodium_mg", &["나트륨", "소듐", "sodium"], "mg"),
    ("calcium_mg", &["칼슘", "calcium"], "mg"),
    ("magnesium_mg", &["마그네슘", "magnesium"], "mg"),
    ("iron_mg", &["철", "철분", "iron"], "mg"),
    (
        "vitamin_k_ug",
        &["비타민K", "비타민 K", "비타민K1", "vitamin K"],
        "µg",
    ),
    ("vitamin_d_ug", &["비타민D", "비타민 D", "vitamin D"], "µg"),
    ("vitamin_c_mg", &["비타민C", "비타민 C", "vitamin C"], "mg"),
    ("vitamin_a_iu", &["비타민A", "비타민 A", "vitamin A"], "IU"),
    ("vitamin_a_rae_ug", &["비타민A", "비타민 A"], "µg"),
    ("fiber_g", &["식이섬유", "섬유질", "fiber"], "g"),
    ("sugar_g", &["당", "당류", "sugar"], "g"),
];

/// Foods checked per request.
pub const MAX_FOODS: usize = 5;

pub const GUIDE_HEADER: &str = "【데이터 기반 주의 가이드】";
pub const GUIDE_DISCLAIMER: &str = "복용 중인 약과 이 음식의 영양 성분 데이터를 비교한 결과, 아래 내용은 참고용으로만 활용해 주세요. 진단이나 확정적 결론이 아니며, 개인별 상담이 필요하면 의료진·약사에게 문의하시기 바랍니다.";
pub const GUIDE_FOOTER: &str = "위 내용은 참고용 가이드이며, 확진이 아닙니다.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DniRule {
    pub ingredient_name: String,
    pub target_nutrient: String,
    pub warning_level: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DniConflict {
    pub ingredient_name: String,
    pub target_nutrient: String,
    pub warning_level: String,
    pub message: Option<String>,
    #[serde(rename = "nutrientValue")]
    pub nutrient_value: f64,
    #[serde(rename = "nutrientUnit")]
    pub nutrient_unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DniResult {
    pub has_conflict: bool,
    pub conflicts: Vec<DniConflict>,
    pub caution_guide_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutrientAmount {
    pub value: f64,
    pub unit: &'static str,
}

/// Label → highest positive amount across all foods. Insertion order is kept
/// so lookups resolve the same way every time.
#[derive(Debug, Default)]
pub struct FoodNutrientMap {
    entries: Vec<(&'static str, NutrientAmount)>,
}

impl FoodNutrientMap {
    pub fn build(items: &[FoodNutrients]) -> Self {
        let mut map = Self::default();
        for item in items {
            for (key, labels, unit) in NUTRIENT_LABELS {
                let value = item.nutrients.get(key).filter(|v| v.is_finite()).unwrap_or(0.0);
                if value <= 0.0 {
                    continue;
                }
                for label in labels.iter() {
                    map.record(label, NutrientAmount { value, unit });
                }
            }
        }
        map
    }

    fn record(&mut self, label: &'static str, amount: NutrientAmount) {
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some((_, existing)) if amount.value > existing.value => *existing = amount,
            Some(_) => {}
            None => self.entries.push((label, amount)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches a rule's nutrient name, ignoring case and whitespace.
    pub fn find(&self, target: &str) -> Option<NutrientAmount> {
        let t = target.trim();
        if t.is_empty() {
            return None;
        }
        let collapsed = collapse_whitespace(t).to_lowercase();
        let stripped = strip_whitespace(t).to_lowercase();
        for (label, amount) in &self.entries {
            if collapse_whitespace(label).to_lowercase() == collapsed
                || strip_whitespace(label).to_lowercase() == stripped
            {
                return Some(*amount);
            }
        }
        self.entries
            .iter()
            .find(|(l, _)| *l == t)
            .map(|(_, a)| *a)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn find_conflicts(rules: &[DniRule], items: &[FoodNutrients]) -> Vec<DniConflict> {
    let food = FoodNutrientMap::build(items);
    rules
        .iter()
        .filter_map(|rule| {
            let amount = food.find(&rule.target_nutrient)?;
            (amount.value > 0.0).then(|| DniConflict {
                ingredient_name: rule.ingredient_name.clone(),
                target_nutrient: rule.target_nutrient.clone(),
                warning_level: rule.warning_level.clone(),
                message: rule.message.clone(),
                nutrient_value: amount.value,
                nutrient_unit: amount.unit.to_string(),
            })
        })
        .collect()
}

/// Advisory text for the conflicts, or an empty string when there are none.
pub fn build_guide_message(conflicts: &[DniConflict]) -> String {
    if conflicts.is_empty() {
        return String::new();
    }
    let mut lines = vec![GUIDE_HEADER.to_string(), GUIDE_DISCLAIMER.to_string()];
    for c in conflicts {
        let msg = c
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{} 함유 음식과 {} 복용 시 주의가 권장될 수 있습니다.",
                    c.target_nutrient, c.ingredient_name
                )
            });
        lines.push(format!(
            "· {}(이)가 100g당 약 {}{} 포함된 데이터가 있습니다. {}",
            c.target_nutrient, c.nutrient_value, c.nutrient_unit, msg
        ));
    }
    lines.push(GUIDE_FOOTER.to_string());
    lines.join("\n")
}

/// Distinct, non-empty active ingredients of the user's active medications.
pub async fn active_ingredients(pool: &SqlitePool, user_id: &str) -> Result<Vec<String>> {
    let names: Vec<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT d.main_ingredient
        FROM user_medications m
        JOIN drug_master d ON d.id = m.drug_id
        WHERE m.user_id = ? AND m.is_active = 1
        ORDER BY d.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut out: Vec<String> = Vec::new();
    for name in names.into_iter().flatten() {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

pub async fn rules_for_ingredients(pool: &SqlitePool, ingredients: &[String]) -> Result<Vec<DniRule>> {
    if ingredients.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ingredients.len()].join(", ");
    let sql = format!(
        "SELECT ingredient_name, target_nutrient, warning_level, message \
         FROM dni_logic WHERE ingredient_name IN ({}) ORDER BY id",
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for name in ingredients {
        query = query.bind(name);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| DniRule {
            ingredient_name: row.get("ingredient_name"),
            target_nutrient: row.get("target_nutrient"),
            warning_level: row.get("warning_level"),
            message: row.get("message"),
        })
        .collect())
}

/// Full inference for one user against a set of foods.
pub async fn infer(pool: &SqlitePool, user_id: &str, items: &[FoodNutrients]) -> Result<DniResult> {
    if items.is_empty() {
        return Ok(DniResult::default());
    }
    let ingredients = active_ingredients(pool, user_id).await?;
    if ingredients.is_empty() {
        return Ok(DniResult::default());
    }
    let rules = rules_for_ingredients(pool, &ingredients).await?;
    if rules.is_empty() {
        return Ok(DniResult::default());
    }

    let conflicts = find_conflicts(&rules, items);
    tracing::debug!(
        user_id,
        rules = rules.len(),
        conflicts = conflicts.len(),
        "dni inference"
    );
    let message = build_guide_message(&conflicts);
    Ok(DniResult {
        has_conflict: !conflicts.is_empty(),
        caution_guide_message: (!message.is_empty()).then_some(message),
        conflicts,
    })
}
