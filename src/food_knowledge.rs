//! Curated food notes (management tips, Q&A) kept alongside USDA numbers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

pub const DEFAULT_LIMIT: i64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodKnowledge {
    pub food_name: String,
    pub clinical_insight: Option<String>,
    pub synthetic_qa: Option<String>,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
    pub sodium: Option<f64>,
}

/// `LIKE` pattern: inner whitespace runs become wildcards.
pub fn search_pattern(query: &str) -> Option<String> {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    Some(format!("%{}%", words.join("%")))
}

pub async fn search(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<FoodKnowledge>> {
    let Some(pattern) = search_pattern(query) else {
        return Ok(Vec::new());
    };
    let rows = sqlx::query(
        r#"
        SELECT food_name, clinical_insight, synthetic_qa, calories, protein, fat, carbs, sodium
        FROM food_knowledge
        WHERE food_name LIKE ?
        LIMIT ?
        "#,
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| FoodKnowledge {
            food_name: row.get("food_name"),
            clinical_insight: row.get("clinical_insight"),
            synthetic_qa: row.get("synthetic_qa"),
            calories: row.get("calories"),
            protein: row.get("protein"),
            fat: row.get("fat"),
            carbs: row.get("carbs"),
            sodium: row.get("sodium"),
        })
        .collect())
}

pub async fn insert(pool: &SqlitePool, item: &FoodKnowledge) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO food_knowledge (
            food_name, clinical_insight, synthetic_qa, calories, protein, fat, carbs, sodium
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.food_name)
    .bind(&item.clinical_insight)
    .bind(&item.synthetic_qa)
    .bind(item.calories)
    .bind(item.protein)
    .bind(item.fat)
    .bind(item.carbs)
    .bind(item.sodium)
    .execute(pool)
    .await?;
    Ok(())
}

pub fn format_for_prompt(rows: &[FoodKnowledge]) -> String {
    rows.iter()
        .map(|r| {
            let mut parts = vec![format!("[{}]", r.food_name)];
            if let Some(tip) = r.clinical_insight.as_deref().filter(|s| !s.is_empty()) {
                parts.push(format!("관리 팁: {}", tip));
            }
            if let Some(qa) = r.synthetic_qa.as_deref().filter(|s| !s.is_empty()) {
                parts.push(format!("Q&A: {}", qa));
            }
            let nutrients: Vec<String> = [
                ("칼로리", r.calories, "kcal"),
                ("단백질", r.protein, "g"),
                ("지방", r.fat, "g"),
                ("탄수화물", r.carbs, "g"),
                ("나트륨", r.sodium, "mg"),
            ]
            .into_iter()
            .filter_map(|(label, v, unit)| v.map(|v| format!("{} {}{}", label, v, unit)))
            .collect();
            if !nutrients.is_empty() {
                parts.push(nutrients.join(", "));
            }
            parts.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
