//! PubMed E-utilities client.
//!
//! `esearch` returns PMIDs as JSON, `efetch` returns article XML which is
//! parsed with a streaming `quick-xml` reader. Requests are spaced at
//! least [`RATE_LIMIT`] apart, which keeps a keyed client under NCBI's
//! ten-requests-per-second ceiling. Chat lookups go through
//! [`PubMedClient::search_with_cache`], which memoises results per
//! normalised query for [`CACHE_TTL`].

use anyhow::{anyhow, bail, Result};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use moka::future::Cache;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::time::Duration;

use crate::config::{ApiConfig, PapersConfig};
use crate::http::with_retry;

pub const RATE_LIMIT: Duration = Duration::from_millis(110);
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const CACHE_CAPACITY: u64 = 256;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PubMedPaper {
    pub pmid: String,
    pub title: String,
    pub r#abstract: String,
    pub authors: String,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub url: String,
}

pub fn paper_url(pmid: &str) -> String {
    format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)
}

/// Lower-cased, whitespace-collapsed cache key.
pub fn cache_key(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn parse_esearch(json: &serde_json::Value) -> Vec<String> {
    json["esearchresult"]["idlist"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Default)]
struct ArticleState {
    paper: PubMedPaper,
    abstract_parts: Vec<String>,
    current_abstract: String,
    authors: Vec<String>,
    last_name: String,
    fore_name: String,
    has_pmid: bool,
    elocation_doi: Option<String>,
    article_id_doi: Option<String>,
}

impl ArticleState {
    fn finish(mut self) -> Option<PubMedPaper> {
        if self.paper.pmid.is_empty() {
            return None;
        }
        let title = self.paper.title.trim().to_string();
        let abstract_text = self.abstract_parts.join(" ");
        if title.is_empty() && abstract_text.is_empty() {
            return None;
        }
        self.paper.title = if title.is_empty() {
            "Untitled".to_string()
        } else {
            title
        };
        self.paper.r#abstract = abstract_text;
        self.paper.authors = self.authors.join(", ");
        self.paper.doi = self.elocation_doi.or(self.article_id_doi);
        self.paper.url = paper_url(&self.paper.pmid);
        Some(self.paper)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Pmid,
    Title,
    Abstract,
    LastName,
    ForeName,
    JournalTitle,
    ELocationDoi,
    ArticleIdDoi,
}

fn attr_is(e: &quick_xml::events::BytesStart, key: &[u8], value: &str) -> bool {
    e.attributes().flatten().any(|a| {
        a.key.as_ref() == key && String::from_utf8_lossy(&a.value).eq_ignore_ascii_case(value)
    })
}

/// Parses efetch `PubmedArticleSet` XML. Articles with neither title nor
/// abstract are skipped; a missing title becomes `Untitled`.
pub fn parse_efetch_xml(xml: &str) -> Result<Vec<PubMedPaper>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut current: Option<ArticleState> = None;
    let mut field = Field::None;
    let mut in_journal = false;
    let mut reference_depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"PubmedArticle" => current = Some(ArticleState::default()),
                b"ReferenceList" | b"CommentsCorrections" => reference_depth += 1,
                b"PMID" if reference_depth == 0 => {
                    if current.as_ref().is_some_and(|c| !c.has_pmid) {
                        field = Field::Pmid;
                    }
                }
                b"ArticleTitle" => field = Field::Title,
                b"AbstractText" => {
                    field = Field::Abstract;
                    if let Some(c) = current.as_mut() {
                        c.current_abstract.clear();
                    }
                }
                b"Author" => {
                    if let Some(c) = current.as_mut() {
                        c.last_name.clear();
                        c.fore_name.clear();
                    }
                }
                b"LastName" => field = Field::LastName,
                b"ForeName" => field = Field::ForeName,
                b"Journal" => in_journal = true,
                b"Title" if in_journal => field = Field::JournalTitle,
                b"ELocationID" if attr_is(e, b"EIdType", "doi") => field = Field::ELocationDoi,
                b"ArticleId" if reference_depth == 0 && attr_is(e, b"IdType", "doi") => {
                    field = Field::ArticleIdDoi
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if let Some(c) = current.as_mut() {
                    match field {
                        Field::Pmid => {
                            c.paper.pmid = text;
                            c.has_pmid = true;
                        }
                        Field::Title => {
                            if !c.paper.title.is_empty() {
                                c.paper.title.push(' ');
                            }
                            c.paper.title.push_str(&text);
                        }
                        Field::Abstract => {
                            if !c.current_abstract.is_empty() {
                                c.current_abstract.push(' ');
                            }
                            c.current_abstract.push_str(&text);
                        }
                        Field::LastName => c.last_name = text,
                        Field::ForeName => c.fore_name = text,
                        Field::JournalTitle => c.paper.journal = Some(text),
                        Field::ELocationDoi => {
                            c.elocation_doi.get_or_insert(text);
                        }
                        Field::ArticleIdDoi => {
                            c.article_id_doi.get_or_insert(text);
                        }
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"PMID" | b"ArticleTitle" | b"LastName" | b"ForeName" | b"ELocationID"
                | b"ArticleId" => field = Field::None,
                b"Title" => {
                    if field == Field::JournalTitle {
                        field = Field::None;
                    }
                }
                b"AbstractText" => {
                    field = Field::None;
                    if let Some(c) = current.as_mut() {
                        let part = c.current_abstract.trim().to_string();
                        if !part.is_empty() {
                            c.abstract_parts.push(part);
                        }
                    }
                }
                b"Author" => {
                    if let Some(c) = current.as_mut() {
                        let name = match (c.fore_name.is_empty(), c.last_name.is_empty()) {
                            (_, true) => c.fore_name.clone(),
                            (true, false) => c.last_name.clone(),
                            (false, false) => format!("{} {}", c.fore_name, c.last_name),
                        };
                        if !name.is_empty() {
                            c.authors.push(name);
                        }
                    }
                }
                b"Journal" => in_journal = false,
                b"ReferenceList" | b"CommentsCorrections" => {
                    reference_depth = reference_depth.saturating_sub(1)
                }
                b"PubmedArticle" => {
                    if let Some(paper) = current.take().and_then(ArticleState::finish) {
                        papers.push(paper);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!("PubMed XML parse error: {}", e),
            _ => {}
        }
        buf.clear();
    }

    Ok(papers)
}

pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_base_ms: u64,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    cache: Cache<String, Vec<PubMedPaper>>,
}

impl PubMedClient {
    pub fn new(apis: &ApiConfig, papers: &PapersConfig) -> Result<Self> {
        let quota =
            Quota::with_period(RATE_LIMIT).ok_or_else(|| anyhow!("invalid PubMed rate limit"))?;
        Ok(Self {
            client: crate::http::client(apis.timeout_secs)?,
            base_url: apis.pubmed_base_url.trim_end_matches('/').to_string(),
            api_key: apis.pubmed_key(),
            max_retries: papers.max_retries,
            retry_base_ms: papers.retry_base_ms,
            limiter: RateLimiter::direct(quota),
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
        })
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn throttle(&self) {
        self.limiter.until_ready().await;
    }

    fn params(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        params.push(("db", "pubmed".to_string()));
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// PMIDs for `query`, most relevant first.
    pub async fn esearch(&self, query: &str, retmax: usize) -> Result<Vec<String>> {
        let params = self.params(vec![
            ("term", query.trim().to_string()),
            ("retmax", retmax.to_string()),
            ("retmode", "json".to_string()),
            ("sort", "relevance".to_string()),
        ]);
        let url = format!("{}/esearch.fcgi", self.base_url);

        let json: serde_json::Value = with_retry(self.max_retries, self.retry_base_ms, || async {
            self.throttle().await;
            let resp = self.client.get(&url).query(&params).send().await?;
            if !resp.status().is_success() {
                bail!("PubMed esearch failed: {}", resp.status());
            }
            Ok(resp.json().await?)
        })
        .await?;

        let ids = parse_esearch(&json);
        tracing::debug!(count = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    pub async fn efetch(&self, pmids: &[String]) -> Result<Vec<PubMedPaper>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let params = self.params(vec![
            ("id", pmids.join(",")),
            ("rettype", "abstract".to_string()),
            ("retmode", "xml".to_string()),
        ]);
        let url = format!("{}/efetch.fcgi", self.base_url);

        let xml = with_retry(self.max_retries, self.retry_base_ms, || async {
            self.throttle().await;
            let resp = self.client.get(&url).query(&params).send().await?;
            if !resp.status().is_success() {
                bail!("PubMed efetch failed: {}", resp.status());
            }
            Ok(resp.text().await?)
        })
        .await?;

        parse_efetch_xml(&xml)
    }

    /// Search and fetch for chat-sized lookups; `retmax` is clamped to 3..=10.
    pub async fn search_and_fetch(&self, query: &str, retmax: usize) -> Result<Vec<PubMedPaper>> {
        let ids = self.esearch(query, retmax.clamp(3, 10)).await?;
        self.efetch(&ids).await
    }

    pub async fn search_with_cache(&self, query: &str, retmax: usize) -> Result<Vec<PubMedPaper>> {
        let key = cache_key(query);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(query = %key, "PubMed cache hit");
            return Ok(hit);
        }
        let papers = self.search_and_fetch(query, retmax).await?;
        self.cache.insert(key, papers.clone()).await;
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">31000001</PMID>
      <Article>
        <Journal><Title>Journal of Bone Research</Title></Journal>
        <ArticleTitle>Vitamin D and fracture risk</ArticleTitle>
        <ELocationID EIdType="doi">10.1000/jbr.1</ELocationID>
        <Abstract>
          <AbstractText Label="BACKGROUND">Vitamin D matters.</AbstractText>
          <AbstractText Label="RESULTS">Fewer fractures &amp; falls.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Kim</LastName><ForeName>Minji</ForeName></Author>
          <Author><LastName>Lee</LastName></Author>
        </AuthorList>
      </Article>
      <CommentsCorrectionsList>
        <CommentsCorrections><PMID>99999999</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>31000002</PMID>
      <Article>
        <Abstract><AbstractText>Only an abstract.</AbstractText></Abstract>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList><ArticleId IdType="doi">10.1000/x.2</ArticleId></ArticleIdList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation><PMID>31000003</PMID><Article></Article></MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_efetch_xml() {
        let papers = parse_efetch_xml(SAMPLE).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.pmid, "31000001");
        assert_eq!(first.title, "Vitamin D and fracture risk");
        assert_eq!(first.r#abstract, "Vitamin D matters. Fewer fractures & falls.");
        assert_eq!(first.journal.as_deref(), Some("Journal of Bone Research"));
        assert_eq!(first.doi.as_deref(), Some("10.1000/jbr.1"));
        assert_eq!(first.authors, "Minji Kim, Lee");
        assert_eq!(first.url, "https://pubmed.ncbi.nlm.nih.gov/31000001/");

        let second = &papers[1];
        assert_eq!(second.title, "Untitled");
        assert_eq!(second.doi.as_deref(), Some("10.1000/x.2"));
    }

    #[test]
    fn test_parse_esearch() {
        let json = serde_json::json!({"esearchresult": {"idlist": ["1", "2"]}});
        assert_eq!(parse_esearch(&json), vec!["1", "2"]);
        assert!(parse_esearch(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn test_cache_key_normalises() {
        assert_eq!(cache_key("  Knee   Osteoarthritis "), "knee osteoarthritis");
    }
}
