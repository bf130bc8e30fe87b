//! Clients for the Korean Ministry of Food and Drug Safety open APIs.
//!
//! - `DrugPrdtPrmsnInfoService07/getDrugPrdtMcpnDtlInq07`: product →
//!   ingredient detail, searched through a widening cascade.
//! - `DrbEasyDrugInfoService/getDrbEasyDrugList` ("e약은요"): consumer
//!   leaflets with efficacy, usage and precautions.
//!
//! The service key is issued pre-encoded, so it is appended verbatim while
//! every other parameter is percent-encoded exactly once.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::http::truncate_chars;

const MCPN07_PATH: &str = "DrugPrdtPrmsnInfoService07/getDrugPrdtMcpnDtlInq07";
const EASY_DRUG_PATH: &str = "DrbEasyDrugInfoService/getDrbEasyDrugList";

/// Brand names whose ingredient search needs the generic name.
const BRAND_TO_INGREDIENT: &[(&str, &str)] = &[
    ("타이레놀", "아세트아미노펜"),
    ("페북트", "페북소스타트"),
    ("페북스타트", "페북소스타트"),
    ("콜킨", "콜치친"),
    ("울로릭", "페북소스타트"),
    ("자일로릭", "알로푸리놀"),
];

pub fn ingredient_for_brand(name: &str) -> &str {
    BRAND_TO_INGREDIENT
        .iter()
        .find(|(brand, _)| *brand == name)
        .map(|(_, ingredient)| *ingredient)
        .unwrap_or(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientItem {
    pub product_name: String,
    pub ingredient_name: String,
    pub company_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EasyDrugItem {
    pub item_seq: String,
    pub product_name: String,
    pub company_name: String,
    pub efficacy: Option<String>,
    pub use_method: Option<String>,
    pub precautions_warn: Option<String>,
    pub precautions: Option<String>,
    pub interaction: Option<String>,
    pub side_effect: Option<String>,
    pub storage_method: Option<String>,
    pub item_image: Option<String>,
    pub open_de: Option<String>,
    pub update_de: Option<String>,
}

/// Search term for one MCPN07 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mcpn07Query {
    Product(String),
    Ingredient(String),
}

/// The requests tried in order until one returns rows.
pub fn cascade(name: &str) -> Vec<Mcpn07Query> {
    let ingredient = ingredient_for_brand(name);
    vec![
        Mcpn07Query::Product(format!("%{}%", name)),
        Mcpn07Query::Product(name.to_string()),
        Mcpn07Query::Product(format!("{}%", name)),
        Mcpn07Query::Ingredient(ingredient.to_string()),
        Mcpn07Query::Ingredient(format!("{}%", ingredient)),
    ]
}

/// Field as trimmed text; the API mixes string and numeric values.
fn text_field(row: &Value, keys: &[&str]) -> String {
    for key in keys {
        let value = match row.get(*key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !value.is_empty() {
            return value;
        }
    }
    String::new()
}

fn optional_field(row: &Value, key: &str) -> Option<String> {
    Some(text_field(row, &[key])).filter(|s| !s.is_empty())
}

/// Validates the header and returns `body.items` as a list. `label` names
/// the API in error messages.
fn response_items(text: &str, label: &str) -> Result<Vec<Value>> {
    let data: Value = serde_json::from_str(text)
        .with_context(|| format!("{} invalid JSON: {}", label, truncate_chars(text, 200)))?;
    let header = data.pointer("/response/header");
    if let Some(code) = header.and_then(|h| h.get("resultCode")) {
        let code = code.as_str().map(str::to_string).unwrap_or_else(|| code.to_string());
        if code != "00" {
            let msg = header
                .and_then(|h| h.get("resultMsg"))
                .and_then(|m| m.as_str())
                .unwrap_or_else(|| truncate_chars(text, 200));
            bail!("{} error: {} - {}", label, code, msg);
        }
    }
    Ok(match data.pointer("/response/body/items") {
        Some(Value::Array(list)) => list.clone(),
        Some(obj @ Value::Object(_)) => vec![obj.clone()],
        _ => Vec::new(),
    })
}

pub fn parse_mcpn07(text: &str) -> Result<Vec<IngredientItem>> {
    Ok(response_items(text, "MFDS MCPN07 API")?
        .iter()
        .map(|r| IngredientItem {
            product_name: text_field(r, &["PRDUCT", "prduct"]),
            ingredient_name: text_field(r, &["MTRAL_NM", "mtral_nm"]),
            company_name: text_field(r, &["ENTRPS", "entrps"]),
        })
        .collect())
}

pub fn parse_easy_drug(text: &str) -> Result<Vec<EasyDrugItem>> {
    Ok(response_items(text, "MFDS API")?
        .iter()
        .map(|r| EasyDrugItem {
            item_seq: text_field(r, &["itemSeq"]),
            product_name: text_field(r, &["itemName"]),
            company_name: text_field(r, &["entpName"]),
            efficacy: optional_field(r, "efcyQesitm"),
            use_method: optional_field(r, "useMethodQesitm"),
            precautions_warn: optional_field(r, "atpnWarnQesitm"),
            precautions: optional_field(r, "atpnQesitm"),
            interaction: optional_field(r, "intrcQesitm"),
            side_effect: optional_field(r, "seQesitm"),
            storage_method: optional_field(r, "depositMethodQesitm"),
            item_image: optional_field(r, "itemImage"),
            open_de: optional_field(r, "openDe"),
            update_de: optional_field(r, "updateDe"),
        })
        .filter(|item| !item.item_seq.is_empty())
        .collect())
}

/// Minimal `application/x-www-form-urlencoded` style component encoding.
pub(crate) fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*'
            | b'\'' | b'(' | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

pub struct MfdsClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl MfdsClient {
    /// `None` when no MFDS key is configured.
    pub fn from_config(apis: &ApiConfig) -> Result<Option<Self>> {
        let Some(service_key) = apis.mfds_key() else {
            return Ok(None);
        };
        Ok(Some(Self {
            http: crate::http::client(apis.timeout_secs)?,
            base_url: apis.mfds_base_url.trim_end_matches('/').to_string(),
            service_key,
        }))
    }

    fn mcpn07_url(&self, query: &Mcpn07Query, page_no: u32, num_of_rows: u32) -> String {
        let term = match query {
            Mcpn07Query::Product(p) => format!("Prduct={}", encode_component(p)),
            Mcpn07Query::Ingredient(i) => format!("MTRAL_NM={}", encode_component(i)),
        };
        format!(
            "{}/{}?serviceKey={}&{}&pageNo={}&numOfRows={}&type=json",
            self.base_url, MCPN07_PATH, self.service_key, term, page_no, num_of_rows
        )
    }

    async fn get_text(&self, url: &str, label: &str) -> Result<String> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            bail!(
                "{} HTTP {}: {}",
                label,
                status.as_u16(),
                truncate_chars(&text, 200)
            );
        }
        Ok(text)
    }

    pub async fn mcpn07(
        &self,
        query: &Mcpn07Query,
        num_of_rows: u32,
    ) -> Result<Vec<IngredientItem>> {
        let url = self.mcpn07_url(query, 1, num_of_rows);
        tracing::debug!(?query, "MFDS MCPN07 request");
        let text = self.get_text(&url, "MFDS MCPN07 API").await?;
        parse_mcpn07(&text)
    }

    /// Product → ingredient lookup, widening the search until rows appear.
    pub async fn search_ingredients(
        &self,
        name: &str,
        num_of_rows: u32,
    ) -> Result<Vec<IngredientItem>> {
        let name = name.trim();
        if name.is_empty() {
            bail!("itemName must not be empty");
        }
        for query in cascade(name) {
            let items = self.mcpn07(&query, num_of_rows).await?;
            if !items.is_empty() {
                return Ok(items);
            }
        }
        Ok(Vec::new())
    }

    pub async fn easy_drug_list(
        &self,
        item_name: &str,
        page_no: u32,
        num_of_rows: u32,
    ) -> Result<Vec<EasyDrugItem>> {
        let item_name = item_name.trim();
        if item_name.is_empty() {
            bail!("itemName must not be empty");
        }
        let url = format!(
            "{}/{}?serviceKey={}&pageNo={}&numOfRows={}&itemName={}&type=json",
            self.base_url,
            EASY_DRUG_PATH,
            self.service_key,
            page_no,
            num_of_rows,
            encode_component(item_name)
        );
        let text = self.get_text(&url, "MFDS API").await?;
        parse_easy_drug(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_order() {
        let steps = cascade("타이레놀");
        assert_eq!(steps[0], Mcpn07Query::Product("%타이레놀%".into()));
        assert_eq!(steps[1], Mcpn07Query::Product("타이레놀".into()));
        assert_eq!(steps[2], Mcpn07Query::Product("타이레놀%".into()));
        assert_eq!(steps[3], Mcpn07Query::Ingredient("아세트아미노펜".into()));
        assert_eq!(steps[4], Mcpn07Query::Ingredient("아세트아미노펜%".into()));
        assert_eq!(ingredient_for_brand("아스피린"), "아스피린");
    }

    #[test]
    fn test_parse_mcpn07_single_object() {
        let text = r#"{"response":{"header":{"resultCode":"00","resultMsg":"OK"},
            "body":{"totalCount":1,"items":{"PRDUCT":"콜킨정","MTRAL_NM":" 콜치친 ","ENTRPS":"한국제약"}}}}"#;
        let items = parse_mcpn07(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ingredient_name, "콜치친");
    }

    #[test]
    fn test_parse_mcpn07_lowercase_fields_and_error_code() {
        let text = r#"{"response":{"header":{"resultCode":"00"},
            "body":{"items":[{"prduct":"A","mtral_nm":"B","entrps":"C"}]}}}"#;
        assert_eq!(parse_mcpn07(text).unwrap()[0].product_name, "A");

        let err = parse_mcpn07(
            r#"{"response":{"header":{"resultCode":"30","resultMsg":"SERVICE KEY IS NOT REGISTERED"}}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "MFDS MCPN07 API error: 30 - SERVICE KEY IS NOT REGISTERED"
        );
        assert!(parse_mcpn07("<xml/>").is_err());
    }

    #[test]
    fn test_parse_easy_drug_drops_rows_without_seq() {
        let text = r#"{"header":{},"response":{"body":{"items":[
            {"itemSeq":200003092,"itemName":"타이레놀정500mg","entpName":"한국존슨앤드존슨","efcyQesitm":"두통에 사용합니다."},
            {"itemName":"no seq"}]}}}"#;
        let items = parse_easy_drug(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_seq, "200003092");
        assert_eq!(items[0].efficacy.as_deref(), Some("두통에 사용합니다."));
        assert_eq!(items[0].precautions, None);
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("%A b%"), "%25A%20b%25");
        assert_eq!(encode_component("콜"), "%EC%BD%9C");
    }
}
