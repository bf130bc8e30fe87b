//! Semantic Scholar batch lookups for citation counts and TLDRs.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::{ApiConfig, PapersConfig};
use crate::http::with_retry;

pub const FIELDS: &str = "title,abstract,citationCount,tldr";
pub const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScholarPaper {
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub r#abstract: Option<String>,
    #[serde(default)]
    pub citation_count: Option<i64>,
    #[serde(default)]
    pub tldr: Option<Tldr>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Tldr {
    #[serde(default)]
    pub text: Option<String>,
}

impl ScholarPaper {
    pub fn tldr_text(&self) -> Option<&str> {
        self.tldr.as_ref()?.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Pairs a batch response with the PMIDs it was requested for. The API
/// answers positionally with `null` (or an `error` object) for unknown ids.
pub fn parse_batch(pmids: &[String], json: &serde_json::Value) -> HashMap<String, ScholarPaper> {
    let mut out = HashMap::new();
    let Some(list) = json.as_array() else {
        return out;
    };
    for (pmid, entry) in pmids.iter().zip(list) {
        if entry.is_null() || entry.get("error").is_some() {
            continue;
        }
        if let Ok(paper) = serde_json::from_value::<ScholarPaper>(entry.clone()) {
            out.insert(pmid.clone(), paper);
        }
    }
    out
}

pub struct ScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_base_ms: u64,
}

impl ScholarClient {
    pub fn new(apis: &ApiConfig, papers: &PapersConfig) -> Result<Self> {
        Ok(Self {
            client: crate::http::client(apis.timeout_secs)?,
            base_url: apis.semantic_scholar_base_url.trim_end_matches('/').to_string(),
            api_key: apis.semantic_scholar_key(),
            max_retries: papers.max_retries,
            retry_base_ms: papers.retry_base_ms,
        })
    }

    /// Looks up `pmids` in batches of [`BATCH_SIZE`], keyed by PMID.
    pub async fn papers_by_pmid(&self, pmids: &[String]) -> Result<HashMap<String, ScholarPaper>> {
        let mut found = HashMap::new();
        let url = format!("{}/paper/batch", self.base_url);

        for batch in pmids.chunks(BATCH_SIZE) {
            let ids: Vec<String> = batch.iter().map(|p| format!("PMID:{}", p)).collect();
            let body = serde_json::json!({ "ids": ids });

            let json: serde_json::Value = with_retry(self.max_retries, self.retry_base_ms, || async {
                let mut req = self
                    .client
                    .post(&url)
                    .query(&[("fields", FIELDS)])
                    .header("Accept", "application/json")
                    .json(&body);
                if let Some(key) = &self.api_key {
                    req = req.header("x-api-key", key);
                }
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    bail!("Semantic Scholar batch failed: {}", resp.status());
                }
                Ok(resp.json().await?)
            })
            .await?;

            found.extend(parse_batch(batch, &json));
        }

        tracing::debug!(requested = pmids.len(), found = found.len(), "Semantic Scholar batch");
        Ok(found)
    }
}
