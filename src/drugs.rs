//! Drug master cache and drug retrieval for the assistant.
//!
//! Lookups go to the local `drug_master` table first and fall back to the
//! MFDS APIs. API results are written back so the next search is a cache
//! hit. Keywords searched often (five times or more) also get the
//! assistant's guide stored as `paper_insight`.

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::http::truncate_chars;
use crate::mfds::{EasyDrugItem, IngredientItem, MfdsClient};
use crate::models::now_timestamp;

pub const CACHE_LIMIT: i64 = 20;
pub const POPULAR_CALL_COUNT: i64 = 5;
pub const MAX_CONTEXT_ITEMS: usize = 20;
const MAX_INSIGHT_PRODUCTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrugMasterRow {
    pub id: i64,
    pub product_name: String,
    pub main_ingredient: Option<String>,
    pub company_name: Option<String>,
    pub item_seq: Option<String>,
    pub ee_doc_data: Option<String>,
    pub ud_doc_data: Option<String>,
    pub nb_doc_data: Option<String>,
    pub paper_insight: Option<String>,
    pub updated_at: String,
}

impl DrugMasterRow {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            product_name: row.get("product_name"),
            main_ingredient: row.get("main_ingredient"),
            company_name: row.get("company_name"),
            item_seq: row.get("item_seq"),
            ee_doc_data: row.get("ee_doc_data"),
            ud_doc_data: row.get("ud_doc_data"),
            nb_doc_data: row.get("nb_doc_data"),
            paper_insight: row.get("paper_insight"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// A drug as shown to the assistant, from either the cache or the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugInfo {
    pub product_name: String,
    pub ingredient_name: String,
    pub company_name: String,
    pub efficacy: Option<String>,
    pub precautions: Option<String>,
}

impl From<&DrugMasterRow> for DrugInfo {
    fn from(r: &DrugMasterRow) -> Self {
        Self {
            product_name: r.product_name.clone(),
            ingredient_name: r.main_ingredient.clone().unwrap_or_default(),
            company_name: r.company_name.clone().unwrap_or_default(),
            efficacy: r.ee_doc_data.clone(),
            precautions: r.nb_doc_data.clone(),
        }
    }
}

impl From<IngredientItem> for DrugInfo {
    fn from(i: IngredientItem) -> Self {
        Self {
            product_name: i.product_name,
            ingredient_name: i.ingredient_name,
            company_name: i.company_name,
            efficacy: None,
            precautions: None,
        }
    }
}

/// Escapes `\`, `%` and `_` for use with `LIKE ... ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}…", truncate_chars(s, max))
    } else {
        s.to_string()
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.trim().is_empty())
}

/// Text block for the assistant prompt.
pub fn format_context(items: &[DrugInfo]) -> String {
    let mut lines = Vec::new();
    for item in items.iter().take(MAX_CONTEXT_ITEMS) {
        let name = if item.product_name.is_empty() {
            "(정보 없음)"
        } else {
            item.product_name.as_str()
        };
        lines.push(format!("■ 제품명: {}", name));
        if !item.ingredient_name.is_empty() {
            lines.push(format!("  성분명: {}", clip(&item.ingredient_name, 300)));
        }
        if !item.company_name.is_empty() {
            lines.push(format!("  업체명: {}", item.company_name));
        }
        if let Some(e) = non_empty(&item.efficacy) {
            lines.push(format!("  효능: {}", clip(e, 600)));
        }
        if let Some(p) = non_empty(&item.precautions) {
            lines.push(format!("  주의사항: {}", clip(p, 600)));
        }
        lines.push(String::new());
    }
    lines.join("\n").trim().to_string()
}

/// Unique ingredient names, in first-seen order.
pub fn paper_keywords(items: &[DrugInfo]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let name = item.ingredient_name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Records a search for `keyword` and returns its running count.
pub async fn increment_search_log(pool: &SqlitePool, keyword: &str) -> Result<i64> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Ok(0);
    }
    let count: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO search_logs (keyword, call_count, last_searched_at)
        VALUES (?, 1, ?)
        ON CONFLICT(keyword) DO UPDATE SET
            call_count = search_logs.call_count + 1,
            last_searched_at = excluded.last_searched_at
        RETURNING call_count
        "#,
    )
    .bind(keyword)
    .bind(now_timestamp())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Partial, case-insensitive product name match.
pub async fn cached_rows(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<DrugMasterRow>> {
    let q = query.trim();
    if q.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{}%", escape_like(q));
    let rows = sqlx::query(
        r#"
        SELECT * FROM drug_master
        WHERE product_name LIKE ? ESCAPE '\'
        ORDER BY product_name ASC
        LIMIT ?
        "#,
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(DrugMasterRow::from_row).collect())
}

/// Upserts drugs on product name. Empty names are skipped.
pub async fn save_drug_infos(pool: &SqlitePool, items: &[DrugInfo]) -> Result<usize> {
    let now = now_timestamp();
    let mut tx = pool.begin().await?;
    let mut saved = 0;
    for item in items.iter().filter(|i| !i.product_name.trim().is_empty()) {
        sqlx::query(
            r#"
            INSERT INTO drug_master (
                product_name, main_ingredient, company_name, ee_doc_data, nb_doc_data, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_name) DO UPDATE SET
                main_ingredient = COALESCE(excluded.main_ingredient, drug_master.main_ingredient),
                company_name = COALESCE(excluded.company_name, drug_master.company_name),
                ee_doc_data = COALESCE(excluded.ee_doc_data, drug_master.ee_doc_data),
                nb_doc_data = COALESCE(excluded.nb_doc_data, drug_master.nb_doc_data),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.product_name.trim())
        .bind(Some(item.ingredient_name.as_str()).filter(|s| !s.is_empty()))
        .bind(Some(item.company_name.as_str()).filter(|s| !s.is_empty()))
        .bind(non_empty(&item.efficacy))
        .bind(non_empty(&item.precautions))
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        saved += 1;
    }
    tx.commit().await?;
    Ok(saved)
}

/// Upserts e약은요 leaflets. Precaution sections are merged into one text.
pub async fn save_easy_drugs(pool: &SqlitePool, items: &[EasyDrugItem]) -> Result<usize> {
    let now = now_timestamp();
    let mut tx = pool.begin().await?;
    let mut saved = 0;
    for item in items.iter().filter(|i| !i.product_name.is_empty()) {
        let precautions: Vec<&str> = [
            &item.precautions_warn,
            &item.precautions,
            &item.interaction,
            &item.side_effect,
        ]
        .into_iter()
        .filter_map(non_empty)
        .collect();
        let precautions = (!precautions.is_empty()).then(|| precautions.join("\n"));

        sqlx::query(
            r#"
            INSERT INTO drug_master (
                product_name, company_name, item_seq, ee_doc_data, ud_doc_data, nb_doc_data, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_name) DO UPDATE SET
                company_name = COALESCE(excluded.company_name, drug_master.company_name),
                item_seq = excluded.item_seq,
                ee_doc_data = COALESCE(excluded.ee_doc_data, drug_master.ee_doc_data),
                ud_doc_data = COALESCE(excluded.ud_doc_data, drug_master.ud_doc_data),
                nb_doc_data = COALESCE(excluded.nb_doc_data, drug_master.nb_doc_data),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.product_name)
        .bind(Some(item.company_name.as_str()).filter(|s| !s.is_empty()))
        .bind(&item.item_seq)
        .bind(non_empty(&item.efficacy))
        .bind(non_empty(&item.use_method))
        .bind(precautions)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        saved += 1;
    }
    tx.commit().await?;
    Ok(saved)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugRagResult {
    pub drug_context: Option<String>,
    pub api_used: bool,
    pub item_count: usize,
    pub paper_search_keywords: Vec<String>,
    pub product_names_for_cache: Vec<String>,
    pub call_count: i64,
    /// Items fetched from the API, persisted after the answer is sent.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_items: Vec<DrugInfo>,
}

fn rag_result(items: Vec<DrugInfo>, call_count: i64, api_used: bool) -> DrugRagResult {
    let product_names_for_cache = if call_count >= POPULAR_CALL_COUNT {
        items
            .iter()
            .map(|i| i.product_name.clone())
            .filter(|n| !n.is_empty())
            .collect()
    } else {
        Vec::new()
    };
    DrugRagResult {
        drug_context: Some(format_context(&items)),
        api_used,
        item_count: items.len(),
        paper_search_keywords: paper_keywords(&items),
        product_names_for_cache,
        call_count,
        api_items: if api_used { items } else { Vec::new() },
    }
}

/// Cache-first drug lookup for one query. Failures degrade to an empty
/// result so the chat can still answer.
pub async fn run_drug_rag(
    pool: &SqlitePool,
    mfds: Option<&MfdsClient>,
    query: &str,
) -> DrugRagResult {
    match try_drug_rag(pool, mfds, query).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(query, error = %e, "drug lookup failed");
            DrugRagResult::default()
        }
    }
}

async fn try_drug_rag(
    pool: &SqlitePool,
    mfds: Option<&MfdsClient>,
    query: &str,
) -> Result<DrugRagResult> {
    let call_count = increment_search_log(pool, query).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "search_logs increment failed");
        0
    });

    let cached = cached_rows(pool, query, CACHE_LIMIT).await?;
    let has_efficacy = cached.iter().any(|r| non_empty(&r.ee_doc_data).is_some());
    tracing::debug!(query, rows = cached.len(), has_efficacy, "drug_master lookup");

    if has_efficacy {
        let items: Vec<DrugInfo> = cached.iter().map(DrugInfo::from).collect();
        return Ok(rag_result(items, call_count, false));
    }

    let Some(mfds) = mfds else {
        tracing::warn!(query, "MFDS key not configured; no drug data available");
        return Ok(DrugRagResult::default());
    };

    let items = mfds.search_ingredients(query, CACHE_LIMIT as u32).await?;
    if items.is_empty() {
        return Ok(DrugRagResult {
            api_used: true,
            ..Default::default()
        });
    }
    let items: Vec<DrugInfo> = items.into_iter().map(DrugInfo::from).collect();
    Ok(rag_result(items, call_count, true))
}

/// Persists what a drug lookup fetched once the answer has been produced.
pub async fn save_drug_rag_results(
    pool: &SqlitePool,
    result: &DrugRagResult,
    guide_text: Option<&str>,
) -> Result<()> {
    if !result.api_items.is_empty() {
        let saved = save_drug_infos(pool, &result.api_items).await?;
        tracing::info!(saved, "cached drug lookup results");
    }

    let guide = guide_text.map(str::trim).filter(|g| !g.is_empty());
    if let (true, Some(guide)) = (result.call_count >= POPULAR_CALL_COUNT, guide) {
        for product in result.product_names_for_cache.iter().take(MAX_INSIGHT_PRODUCTS) {
            sqlx::query("UPDATE drug_master SET paper_insight = ?, updated_at = ? WHERE product_name = ?")
                .bind(guide)
                .bind(now_timestamp())
                .bind(product)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientLookup {
    pub rows: Vec<DrugMasterRow>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<usize>,
}

/// Ingredient rows for a product name, fetching from MCPN07 on a miss.
pub async fn ingredient_lookup(
    pool: &SqlitePool,
    mfds: Option<&MfdsClient>,
    product_name: &str,
) -> Result<IngredientLookup> {
    let cached = cached_rows(pool, product_name, CACHE_LIMIT).await?;
    if cached.iter().any(|r| non_empty(&r.main_ingredient).is_some()) {
        return Ok(IngredientLookup {
            rows: cached,
            from_cache: true,
            saved: None,
        });
    }

    let mfds = mfds.ok_or_else(|| anyhow::anyhow!("MFDS API key is not configured"))?;
    let items: Vec<DrugInfo> = mfds
        .search_ingredients(product_name, CACHE_LIMIT as u32)
        .await?
        .into_iter()
        .map(DrugInfo::from)
        .collect();
    let saved = save_drug_infos(pool, &items).await?;

    let mut rows = Vec::new();
    for item in &items {
        let row = sqlx::query("SELECT * FROM drug_master WHERE product_name = ?")
            .bind(item.product_name.trim())
            .fetch_optional(pool)
            .await?;
        if let Some(row) = row {
            let row = DrugMasterRow::from_row(&row);
            if !rows.iter().any(|r: &DrugMasterRow| r.id == row.id) {
                rows.push(row);
            }
        }
    }
    Ok(IngredientLookup {
        rows,
        from_cache: false,
        saved: Some(saved),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, ingredient: &str) -> DrugInfo {
        DrugInfo {
            product_name: name.into(),
            ingredient_name: ingredient.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
        assert_eq!(escape_like("타이레놀"), "타이레놀");
    }

    #[test]
    fn test_context_format_and_clipping() {
        let long = "가".repeat(700);
        let items = vec![
            DrugInfo {
                product_name: "타이레놀정".into(),
                ingredient_name: "아세트아미노펜".into(),
                company_name: "한국존슨앤드존슨".into(),
                efficacy: Some(long.clone()),
                precautions: Some("  ".into()),
            },
            info("", ""),
        ];
        let text = format_context(&items);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "■ 제품명: 타이레놀정");
        assert_eq!(lines[1], "  성분명: 아세트아미노펜");
        assert_eq!(lines[2], "  업체명: 한국존슨앤드존슨");
        assert!(lines[3].starts_with("  효능: "));
        assert!(lines[3].ends_with('…'));
        assert_eq!(lines[3].chars().count(), "  효능: ".chars().count() + 601);
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "■ 제품명: (정보 없음)");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_context_caps_items() {
        let items: Vec<DrugInfo> = (0..30).map(|i| info(&format!("약{}", i), "")).collect();
        let text = format_context(&items);
        assert_eq!(text.matches("■ 제품명").count(), MAX_CONTEXT_ITEMS);
    }

    #[test]
    fn test_keywords_unique() {
        let items = vec![info("a", "콜치친"), info("b", " 콜치친 "), info("c", ""), info("d", "알로푸리놀")];
        assert_eq!(paper_keywords(&items), vec!["콜치친", "알로푸리놀"]);
    }

    #[test]
    fn test_popular_queries_mark_products_for_cache() {
        let items = vec![info("콜킨정", "콜치친")];
        let quiet = rag_result(items.clone(), 4, true);
        assert!(quiet.product_names_for_cache.is_empty());
        assert_eq!(quiet.api_items.len(), 1);

        let popular = rag_result(items, 5, false);
        assert_eq!(popular.product_names_for_cache, vec!["콜킨정"]);
        assert!(popular.api_items.is_empty());
        assert_eq!(popular.item_count, 1);
    }
}
