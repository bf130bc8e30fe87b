//! USDA FoodData Central client.
//!
//! Search results are normalised to values per 100 g so the chat prompt and
//! the drug–nutrient check can compare foods directly.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::ApiConfig;

/// Energy, macros, and the micronutrients the interaction rules look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NutrientsPer100g {
    pub energy_kcal: f64,
    pub protein_g: f64,
    pub carbohydrate_g: f64,
    pub fat_g: f64,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub calcium_mg: Option<f64>,
    pub iron_mg: Option<f64>,
    pub potassium_mg: Option<f64>,
    pub vitamin_c_mg: Option<f64>,
    pub vitamin_a_iu: Option<f64>,
    pub vitamin_d_ug: Option<f64>,
    pub magnesium_mg: Option<f64>,
    pub vitamin_a_rae_ug: Option<f64>,
    pub vitamin_k_ug: Option<f64>,
    pub choline_mg: Option<f64>,
}

impl NutrientsPer100g {
    /// Value by nutrient key (`"potassium_mg"`, ...). Macros are always present.
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "energy_kcal" => Some(self.energy_kcal),
            "protein_g" => Some(self.protein_g),
            "carbohydrate_g" => Some(self.carbohydrate_g),
            "fat_g" => Some(self.fat_g),
            "fiber_g" => self.fiber_g,
            "sugar_g" => self.sugar_g,
            "sodium_mg" => self.sodium_mg,
            "calcium_mg" => self.calcium_mg,
            "iron_mg" => self.iron_mg,
            "potassium_mg" => self.potassium_mg,
            "vitamin_c_mg" => self.vitamin_c_mg,
            "vitamin_a_iu" => self.vitamin_a_iu,
            "vitamin_d_ug" => self.vitamin_d_ug,
            "magnesium_mg" => self.magnesium_mg,
            "vitamin_a_rae_ug" => self.vitamin_a_rae_ug,
            "vitamin_k_ug" => self.vitamin_k_ug,
            "choline_mg" => self.choline_mg,
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: f64) {
        match key {
            "energy_kcal" => self.energy_kcal = value,
            "protein_g" => self.protein_g = value,
            "carbohydrate_g" => self.carbohydrate_g = value,
            "fat_g" => self.fat_g = value,
            "fiber_g" => self.fiber_g = Some(value),
            "sugar_g" => self.sugar_g = Some(value),
            "sodium_mg" => self.sodium_mg = Some(value),
            "calcium_mg" => self.calcium_mg = Some(value),
            "iron_mg" => self.iron_mg = Some(value),
            "potassium_mg" => self.potassium_mg = Some(value),
            "vitamin_c_mg" => self.vitamin_c_mg = Some(value),
            "vitamin_a_iu" => self.vitamin_a_iu = Some(value),
            "vitamin_d_ug" => self.vitamin_d_ug = Some(value),
            "magnesium_mg" => self.magnesium_mg = Some(value),
            "vitamin_a_rae_ug" => self.vitamin_a_rae_ug = Some(value),
            "vitamin_k_ug" => self.vitamin_k_ug = Some(value),
            "choline_mg" => self.choline_mg = Some(value),
            _ => {}
        }
    }
}

/// FoodData Central nutrient id to field key.
pub fn nutrient_key(id: i64) -> Option<&'static str> {
    Some(match id {
        1008 => "energy_kcal",
        1003 => "protein_g",
        1005 => "carbohydrate_g",
        1004 => "fat_g",
        1079 => "fiber_g",
        2000 => "sugar_g",
        1093 => "sodium_mg",
        1087 => "calcium_mg",
        1089 => "iron_mg",
        1092 => "potassium_mg",
        1162 => "vitamin_c_mg",
        1104 => "vitamin_a_iu",
        1114 => "vitamin_d_ug",
        1106 => "vitamin_a_rae_ug",
        1090 => "magnesium_mg",
        1180 => "choline_mg",
        1185 => "vitamin_k_ug",
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodNutrient {
    pub nutrient_id: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodItem {
    pub fdc_id: i64,
    pub description: String,
    pub data_type: String,
    pub serving_size: f64,
    pub serving_size_unit: String,
    pub nutrients: Vec<FoodNutrient>,
}

/// One food with nutrients already scaled to 100 g.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodNutrients {
    pub description: String,
    pub nutrients: NutrientsPer100g,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn nutrients_per_100g(food: &FoodItem) -> NutrientsPer100g {
    let serving_g = if food.serving_size_unit.eq_ignore_ascii_case("g") {
        food.serving_size
    } else {
        100.0
    };
    let ratio = if serving_g > 0.0 { 100.0 / serving_g } else { 1.0 };

    let mut out = NutrientsPer100g::default();
    for n in &food.nutrients {
        if let Some(key) = nutrient_key(n.nutrient_id) {
            out.set(key, round2(n.value * ratio));
        }
    }
    out
}

/// Parses a `/foods/search` response body.
pub fn parse_search_response(json: &Value) -> Vec<FoodItem> {
    let Some(foods) = json.get("foods").and_then(|f| f.as_array()) else {
        return Vec::new();
    };
    foods
        .iter()
        .map(|f| FoodItem {
            fdc_id: f.get("fdcId").and_then(|v| v.as_i64()).unwrap_or(0),
            description: f
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            data_type: f
                .get("dataType")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            serving_size: f.get("servingSize").and_then(|v| v.as_f64()).unwrap_or(100.0),
            serving_size_unit: f
                .get("servingSizeUnit")
                .and_then(|v| v.as_str())
                .unwrap_or("g")
                .to_string(),
            nutrients: f
                .get("foodNutrients")
                .and_then(|n| n.as_array())
                .map(|list| {
                    list.iter()
                        .filter_map(|n| {
                            Some(FoodNutrient {
                                nutrient_id: n.get("nutrientId")?.as_i64()?,
                                value: n.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

pub struct UsdaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UsdaClient {
    /// `None` when no USDA key is configured.
    pub fn from_config(apis: &ApiConfig) -> Result<Option<Self>> {
        let Some(api_key) = apis.usda_key() else {
            return Ok(None);
        };
        Ok(Some(Self {
            http: crate::http::client(apis.timeout_secs)?,
            base_url: apis.usda_base_url.trim_end_matches('/').to_string(),
            api_key,
        }))
    }

    pub async fn search_food(&self, query: &str, page_size: usize) -> Result<Vec<FoodItem>> {
        let url = format!("{}/foods/search", self.base_url);
        let page_size = page_size.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("query", query.trim()),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "USDA search failed: {} {}",
                status.as_u16(),
                crate::http::truncate_chars(&body, 200)
            );
        }
        let json: Value = response.json().await?;
        Ok(parse_search_response(&json))
    }

    /// Top `max_foods` hits with per-100 g nutrients.
    pub async fn search_and_get_nutrients(
        &self,
        query: &str,
        max_foods: usize,
    ) -> Result<Vec<FoodNutrients>> {
        let foods = self.search_food(query, max_foods.max(5)).await?;
        Ok(foods
            .iter()
            .take(max_foods)
            .map(|f| FoodNutrients {
                description: f.description.clone(),
                nutrients: nutrients_per_100g(f),
            })
            .collect())
    }
}

/// Text block injected into the chat prompt.
pub fn format_for_prompt(items: &[FoodNutrients]) -> String {
    items
        .iter()
        .map(|item| {
            let n = &item.nutrients;
            let mut lines = vec![
                format!("[{}] 100g당:", item.description),
                format!(
                    "  에너지 {} kcal, 단백질 {} g, 탄수화물 {} g, 지방 {} g",
                    n.energy_kcal, n.protein_g, n.carbohydrate_g, n.fat_g
                ),
            ];
            let optional = [
                ("식이섬유", n.fiber_g, "g"),
                ("당류", n.sugar_g, "g"),
                ("나트륨", n.sodium_mg, "mg"),
                ("칼슘", n.calcium_mg, "mg"),
                ("칼륨", n.potassium_mg, "mg"),
                ("철", n.iron_mg, "mg"),
                ("비타민 C", n.vitamin_c_mg, "mg"),
                ("비타민 A", n.vitamin_a_iu, "IU"),
                ("비타민 D", n.vitamin_d_ug, "µg"),
            ];
            for (label, value, unit) in optional {
                if let Some(v) = value {
                    lines.push(format!("  {} {} {}", label, v, unit));
                }
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
