//! Paper chunk store and retrieval for literature-grounded answers.
//!
//! Chunks live in `paper_chunks` with their embedding as a blob. Retrieval
//! embeds the query and ranks stored vectors by cosine similarity in
//! process. When no vector search is possible (provider disabled, the
//! embedding call fails, or nothing stored has an embedding) a keyword
//! overlap search over the most-cited chunks is used instead.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

use crate::embedding::{self, blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::models::{now_timestamp, PaperChunk};

/// A chunk ready to be written, with an optional embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPaperChunk {
    #[serde(default)]
    pub pmid: Option<String>,
    pub title: String,
    #[serde(default)]
    pub r#abstract: Option<String>,
    #[serde(default)]
    pub citation_count: i64,
    #[serde(default)]
    pub tldr: Option<String>,
    pub chunk_text: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// Stand-in identifier for papers without a PMID, stable per title.
pub fn pseudo_pmid(title: &str) -> String {
    let digest = Sha256::digest(title.trim().as_bytes());
    format!("hash-{}", &hex::encode(digest)[..16])
}

pub fn is_pseudo_pmid(pmid: &str) -> bool {
    pmid.starts_with("hash-")
}

/// Deletes every stored chunk of `pmid` and inserts `chunks` in one
/// transaction. Returns the number inserted.
pub async fn replace_paper(pool: &SqlitePool, pmid: &str, chunks: &[NewPaperChunk]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM paper_chunks WHERE pmid = ?")
        .bind(pmid)
        .execute(&mut *tx)
        .await?;

    let now = now_timestamp();
    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO paper_chunks (
                id, pmid, title, abstract, citation_count, tldr, chunk_text, embedding, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(pmid)
        .bind(&chunk.title)
        .bind(&chunk.r#abstract)
        .bind(chunk.citation_count)
        .bind(&chunk.tldr)
        .bind(&chunk.chunk_text)
        .bind(chunk.embedding.as_deref().map(vec_to_blob))
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(chunks.len())
}

/// Ranks every embedded chunk against `query_vec`, keeping hits at or
/// above `threshold`. Fails when nothing stored carries an embedding.
pub async fn vector_search(
    pool: &SqlitePool,
    query_vec: &[f32],
    threshold: f32,
    top_k: usize,
) -> Result<Vec<PaperChunk>> {
    let rows = sqlx::query(
        r#"
        SELECT id, pmid, title, abstract, citation_count, tldr, chunk_text, embedding
        FROM paper_chunks
        WHERE embedding IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        bail!("no embedded paper chunks stored");
    }

    let mut hits: Vec<PaperChunk> = rows
        .iter()
        .filter_map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let sim = cosine_similarity(query_vec, &blob_to_vec(&blob));
            if sim < threshold {
                return None;
            }
            let mut chunk = PaperChunk::from_row(row);
            chunk.similarity = sim as f64;
            Some(chunk)
        })
        .collect();

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k);
    Ok(hits)
}

pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Scores the `top_k * 3` most-cited chunks by how many query terms they
/// contain.
pub async fn keyword_search(pool: &SqlitePool, query: &str, top_k: usize) -> Result<Vec<PaperChunk>> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT id, pmid, title, abstract, citation_count, tldr, chunk_text
        FROM paper_chunks
        ORDER BY citation_count DESC
        LIMIT ?
        "#,
    )
    .bind((top_k * 3) as i64)
    .fetch_all(pool)
    .await?;

    let candidates: Vec<PaperChunk> = rows.iter().map(PaperChunk::from_row).collect();
    Ok(rank_by_terms(candidates, &terms, top_k))
}

fn rank_by_terms(candidates: Vec<PaperChunk>, terms: &[String], top_k: usize) -> Vec<PaperChunk> {
    let mut scored: Vec<PaperChunk> = candidates
        .into_iter()
        .filter_map(|mut c| {
            let text = format!("{} {}", c.title, c.chunk_text).to_lowercase();
            let score = terms.iter().filter(|t| text.contains(t.as_str())).count();
            if score == 0 {
                return None;
            }
            c.similarity = score as f64;
            Some(c)
        })
        .collect();
    // Stable sort keeps citation order among equal scores.
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

/// Vector search with keyword fallback.
pub async fn search_papers(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    query: &str,
    threshold: f32,
    top_k: usize,
) -> Result<Vec<PaperChunk>> {
    let vector = async {
        let query_vec = embedding::embed_query(provider, query).await?;
        vector_search(pool, &query_vec, threshold, top_k).await
    };
    match vector.await {
        Ok(hits) => Ok(hits),
        Err(e) => {
            tracing::debug!(error = %e, "vector search unavailable, using keyword search");
            keyword_search(pool, query, top_k).await
        }
    }
}

pub fn format_paper_context(chunks: &[PaperChunk]) -> String {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for c in chunks {
        let key = if c.pmid.is_empty() { &c.title } else { &c.pmid };
        if !seen.insert(key.clone()) {
            continue;
        }
        let label = if is_pseudo_pmid(&c.pmid) {
            String::new()
        } else {
            format!(" (PMID: {})", c.pmid)
        };
        items.push(format!("[{}{}]\n{}", c.title, label, c.chunk_text));
        if let Some(tldr) = c.tldr.as_deref().filter(|t| !t.is_empty()) {
            items.push(format!("  → TLDR: {}", tldr));
        }
    }

    items.join("\n\n")
}

/// Citation footer listing PubMed links; empty without real PMIDs.
pub fn format_disclaimer(chunks: &[PaperChunk]) -> String {
    let refs: Vec<String> = chunks
        .iter()
        .filter(|c| !c.pmid.is_empty() && !is_pseudo_pmid(&c.pmid))
        .map(|c| {
            format!(
                "[{}](https://pubmed.ncbi.nlm.nih.gov/{}/) (PMID: {})",
                c.title, c.pmid, c.pmid
            )
        })
        .collect();
    if refs.is_empty() {
        return String::new();
    }
    format!(
        "\n\n본 정보는 {} 등 학술 자료를 근거로 작성되었으며, 정확한 진단은 전문의와 상의하세요.",
        refs.join(", ")
    )
}

#[derive(Debug, Default, Serialize)]
pub struct ImportStats {
    pub lines: usize,
    pub papers: usize,
    pub chunks: usize,
    pub embedded: usize,
}

/// Imports chunks from a JSON-lines file, one [`NewPaperChunk`] per line.
///
/// Lines are grouped by pmid (or a title-derived `hash-` id) and each
/// group replaces what is stored for that paper. Chunks are embedded when
/// `provider` is given.
pub async fn import_jsonl(
    pool: &SqlitePool,
    provider: Option<&dyn EmbeddingProvider>,
    path: &Path,
) -> Result<ImportStats> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;

    let mut stats = ImportStats::default();
    let mut groups: Vec<(String, Vec<NewPaperChunk>)> = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let chunk: NewPaperChunk = serde_json::from_str(line)
            .with_context(|| format!("invalid paper chunk on line {}", lineno + 1))?;
        if chunk.chunk_text.trim().is_empty() {
            bail!("chunk_text must not be empty (line {})", lineno + 1);
        }
        stats.lines += 1;

        let pmid = chunk
            .pmid
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| pseudo_pmid(&chunk.title));
        match groups.iter_mut().find(|(p, _)| *p == pmid) {
            Some((_, chunks)) => chunks.push(chunk),
            None => groups.push((pmid, vec![chunk])),
        }
    }

    for (pmid, mut chunks) in groups {
        if let Some(provider) = provider {
            let texts: Vec<String> = chunks
                .iter()
                .map(|c| crate::http::truncate_chars(&c.chunk_text, embedding::MAX_QUERY_CHARS).to_string())
                .collect();
            let vectors = provider.embed(&texts).await?;
            for (chunk, vector) in chunks.iter_mut().zip(vectors) {
                chunk.embedding = Some(vector);
                stats.embedded += 1;
            }
        }
        stats.chunks += replace_paper(pool, &pmid, &chunks).await?;
        stats.papers += 1;
    }

    tracing::info!(
        papers = stats.papers,
        chunks = stats.chunks,
        embedded = stats.embedded,
        "imported paper chunks"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(pmid: &str, title: &str, text: &str, tldr: Option<&str>) -> PaperChunk {
        PaperChunk {
            id: String::new(),
            pmid: pmid.into(),
            title: title.into(),
            r#abstract: None,
            citation_count: 0,
            tldr: tldr.map(String::from),
            chunk_text: text.into(),
            similarity: 0.0,
        }
    }

    #[test]
    fn test_pseudo_pmid_is_stable() {
        let a = pseudo_pmid("Vitamin D and bone");
        assert!(a.starts_with("hash-"));
        assert_eq!(a.len(), 21);
        assert_eq!(a, pseudo_pmid("  Vitamin D and bone "));
    }

    #[test]
    fn test_query_terms_drop_single_chars() {
        assert_eq!(query_terms("a Vitamin D 결핍"), vec!["vitamin", "결핍"]);
    }

    #[test]
    fn test_rank_by_terms() {
        let candidates = vec![
            chunk("1", "Sleep", "sleep quality", None),
            chunk("2", "Vitamin D", "vitamin d and bone density", None),
            chunk("3", "Bone", "bone health", None),
        ];
        let terms = query_terms("vitamin bone");
        let ranked = rank_by_terms(candidates, &terms, 5);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].pmid, "2");
        assert_eq!(ranked[0].similarity, 2.0);
        assert_eq!(ranked[1].pmid, "3");
    }

    #[test]
    fn test_context_dedupes_and_hides_pseudo_ids() {
        let chunks = vec![
            chunk("123", "Paper A", "first", Some("short")),
            chunk("123", "Paper A", "second", None),
            chunk("hash-abcd", "Paper B", "body", None),
        ];
        assert_eq!(
            format_paper_context(&chunks),
            "[Paper A (PMID: 123)]\nfirst\n\n  → TLDR: short\n\n[Paper B]\nbody"
        );
    }

    #[test]
    fn test_disclaimer() {
        assert_eq!(format_disclaimer(&[]), "");
        assert_eq!(format_disclaimer(&[chunk("hash-1", "x", "y", None)]), "");
        let text = format_disclaimer(&[chunk("42", "Paper", "y", None)]);
        assert!(text.contains("[Paper](https://pubmed.ncbi.nlm.nih.gov/42/) (PMID: 42)"));
        assert!(text.ends_with("전문의와 상의하세요."));
    }
}
