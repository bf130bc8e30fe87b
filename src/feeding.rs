//! Literature feeding: pulls well-cited PubMed papers for a query into
//! the local chunk store.
//!
//! ```text
//! smart cache? ──yes──▶ done (cached)
//!      │no
//!      ▼
//! esearch ─▶ efetch ─▶ Semantic Scholar ─▶ citation filter ─▶ chunk ─▶ embed ─▶ replace rows
//! ```
//!
//! Failures after the PubMed stages are collected into `errors` rather
//! than aborting the run, so a partial feed still stores what it can.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::chunk::chunk_text;
use crate::config::PapersConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::papers::{self, NewPaperChunk};
use crate::pubmed::{PubMedClient, PubMedPaper};
use crate::scholar::ScholarClient;

/// Stored chunks that must match before a feed is skipped.
pub const CACHE_HIT_MIN_CHUNKS: usize = 2;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedingResult {
    pub query: String,
    pub pmids_found: usize,
    pub papers_stored: usize,
    pub chunks_stored: usize,
    pub cached: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EnrichedPaper {
    pub paper: PubMedPaper,
    pub citation_count: i64,
    pub tldr: Option<String>,
}

/// Keeps papers with at least `min_citations`, most cited first.
pub fn select_papers(mut papers: Vec<EnrichedPaper>, min_citations: i64, max_papers: usize) -> Vec<EnrichedPaper> {
    papers.retain(|p| p.citation_count >= min_citations);
    papers.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
    papers.truncate(max_papers);
    papers
}

pub struct Feeder<'a> {
    pub pool: &'a SqlitePool,
    pub embedder: &'a dyn EmbeddingProvider,
    pub pubmed: &'a PubMedClient,
    pub scholar: &'a ScholarClient,
    pub config: &'a PapersConfig,
}

impl Feeder<'_> {
    async fn smart_cache_hit(&self, query: &str) -> bool {
        if !self.embedder.is_enabled() {
            return false;
        }
        let lookup = async {
            let vector = embedding::embed_query(self.embedder, query).await?;
            papers::vector_search(
                self.pool,
                &vector,
                self.config.cache_threshold,
                CACHE_HIT_MIN_CHUNKS,
            )
            .await
        };
        matches!(lookup.await, Ok(hits) if hits.len() >= CACHE_HIT_MIN_CHUNKS)
    }

    pub async fn run(&self, query: &str, skip_cache: bool) -> FeedingResult {
        let mut result = FeedingResult {
            query: query.to_string(),
            ..Default::default()
        };

        if !skip_cache && self.smart_cache_hit(query).await {
            tracing::info!(query, "paper feed skipped, store already covers query");
            result.cached = true;
            return result;
        }

        let pmids = match self.pubmed.esearch(query, self.config.pubmed_retmax).await {
            Ok(ids) => ids,
            Err(e) => {
                result.errors.push(format!("PubMed 검색 실패: {}", e));
                return result;
            }
        };
        result.pmids_found = pmids.len();
        if pmids.is_empty() {
            return result;
        }

        let fetched = match self.pubmed.efetch(&pmids).await {
            Ok(papers) => papers,
            Err(e) => {
                result.errors.push(format!("PubMed 초록 수집 실패: {}", e));
                return result;
            }
        };

        let scholar = match self.scholar.papers_by_pmid(&pmids).await {
            Ok(map) => map,
            Err(e) => {
                result.errors.push(format!("Semantic Scholar 수집 실패: {}", e));
                Default::default()
            }
        };

        let enriched: Vec<EnrichedPaper> = fetched
            .into_iter()
            .map(|paper| {
                let meta = scholar.get(&paper.pmid);
                EnrichedPaper {
                    citation_count: meta.and_then(|m| m.citation_count).unwrap_or(0),
                    tldr: meta.and_then(|m| m.tldr_text()).map(String::from),
                    paper,
                }
            })
            .collect();

        for item in select_papers(enriched, self.config.min_citations, self.config.max_papers) {
            match self.store_paper(&item).await {
                Ok(0) => {}
                Ok(n) => {
                    result.papers_stored += 1;
                    result.chunks_stored += n;
                }
                Err(e) => result.errors.push(e),
            }
        }

        tracing::info!(
            query,
            pmids = result.pmids_found,
            papers = result.papers_stored,
            chunks = result.chunks_stored,
            "paper feed finished"
        );
        result
    }

    async fn store_paper(&self, item: &EnrichedPaper) -> Result<usize, String> {
        let paper = &item.paper;
        let source = if paper.r#abstract.trim().is_empty() {
            &paper.title
        } else {
            &paper.r#abstract
        };
        let texts = chunk_text(source, self.config.chunk_size, self.config.chunk_overlap);
        if texts.is_empty() {
            return Ok(0);
        }

        let vectors = if self.embedder.is_enabled() {
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| format!("임베딩 실패 (pmid={}): {}", paper.pmid, e))?;
            Some(vectors)
        } else {
            None
        };

        let abstract_text = Some(paper.r#abstract.clone()).filter(|a| !a.is_empty());
        let chunks: Vec<NewPaperChunk> = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| NewPaperChunk {
                pmid: Some(paper.pmid.clone()),
                title: paper.title.clone(),
                r#abstract: abstract_text.clone(),
                citation_count: item.citation_count,
                tldr: item.tldr.clone(),
                chunk_text: text,
                embedding: vectors.as_ref().and_then(|v| v.get(i).cloned()),
            })
            .collect();

        papers::replace_paper(self.pool, &paper.pmid, &chunks)
            .await
            .map_err(|e| format!("DB 저장 실패 (pmid={}): {}", paper.pmid, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enriched(pmid: &str, citations: i64) -> EnrichedPaper {
        EnrichedPaper {
            paper: PubMedPaper {
                pmid: pmid.into(),
                ..Default::default()
            },
            citation_count: citations,
            tldr: None,
        }
    }

    #[test]
    fn test_select_papers_filters_and_sorts() {
        let picked = select_papers(
            vec![enriched("a", 2), enriched("b", 40), enriched("c", 3), enriched("d", 10)],
            3,
            2,
        );
        let ids: Vec<&str> = picked.iter().map(|p| p.paper.pmid.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = FeedingResult {
            query: "knee".into(),
            pmids_found: 4,
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["pmidsFound"], 4);
        assert_eq!(json["chunksStored"], 0);
        assert_eq!(json["cached"], false);
    }
}
