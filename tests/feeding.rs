//! Literature feeding and retrieval against stubbed upstream services.
//!
//! A small axum app stands in for PubMed E-utilities and the Semantic
//! Scholar batch endpoint; a keyword embedder stands in for OpenAI so the
//! vector path runs with predictable similarities.

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use docent::config::Config;
use docent::embedding::EmbeddingProvider;
use docent::feeding::Feeder;
use docent::papers::{self, NewPaperChunk};
use docent::pubmed::{PubMedClient, RATE_LIMIT};
use docent::scholar::ScholarClient;
use docent::{db, migrate};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const EFETCH_XML: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>4001</PMID>
      <Article>
        <ArticleTitle>Knee exercise trial</ArticleTitle>
        <Abstract>
          <AbstractText>Knee strengthening lowered pain in older adults. Knee function improved after twelve weeks of supervised exercise.</AbstractText>
        </Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>4002</PMID>
      <Article>
        <ArticleTitle>Rarely cited knee note</ArticleTitle>
        <Abstract><AbstractText>Knee braces were tried.</AbstractText></Abstract>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

#[derive(Default)]
struct Upstream {
    esearch_calls: AtomicUsize,
    efetch_calls: AtomicUsize,
}

async fn esearch(State(up): State<Arc<Upstream>>) -> Json<Value> {
    up.esearch_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "esearchresult": { "idlist": ["4001", "4002"] } }))
}

async fn efetch(State(up): State<Arc<Upstream>>) -> String {
    up.efetch_calls.fetch_add(1, Ordering::SeqCst);
    EFETCH_XML.to_string()
}

async fn scholar_batch() -> Json<Value> {
    Json(json!([
        { "paperId": "s1", "citationCount": 42, "tldr": { "text": "Strength work helps knees." } },
        { "paperId": "s2", "citationCount": 1 }
    ]))
}

/// Serves the stub upstream and returns its base URL.
async fn spawn_upstream(up: Arc<Upstream>) -> String {
    let app = Router::new()
        .route("/esearch.fcgi", get(esearch))
        .route("/efetch.fcgi", get(efetch))
        .route("/paper/batch", post(scholar_batch))
        .with_state(up);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_config(tmp: &TempDir, upstream: &str) -> Config {
    let content = format!(
        r#"
[db]
path = "{}"

[papers]
chunk_size = 60
chunk_overlap = 10
min_citations = 3
max_retries = 1
retry_base_ms = 10

[apis]
pubmed_base_url = "{upstream}"
semantic_scholar_base_url = "{upstream}"
"#,
        tmp.path().join("docent.sqlite").display(),
    );
    toml::from_str(&content).unwrap()
}

async fn test_pool(cfg: &Config) -> SqlitePool {
    let pool = db::connect(cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    pool
}

/// Three-axis embedder: knee, sleep, and a small constant so no vector is zero.
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    vec![
        if lower.contains("knee") { 1.0 } else { 0.0 },
        if lower.contains("sleep") { 1.0 } else { 0.0 },
        0.1,
    ]
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

fn stored_chunk(title: &str, text: &str) -> NewPaperChunk {
    NewPaperChunk {
        title: title.to_string(),
        citation_count: 10,
        chunk_text: text.to_string(),
        embedding: Some(keyword_vector(text)),
        ..Default::default()
    }
}

// ─── Feeding ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_feed_stores_cited_papers_with_embeddings() {
    let tmp = TempDir::new().unwrap();
    let up = Arc::new(Upstream::default());
    let base = spawn_upstream(up.clone()).await;
    let cfg = test_config(&tmp, &base);
    let pool = test_pool(&cfg).await;

    let pubmed = PubMedClient::new(&cfg.apis, &cfg.papers).unwrap();
    let scholar = ScholarClient::new(&cfg.apis, &cfg.papers).unwrap();
    let feeder = Feeder {
        pool: &pool,
        embedder: &KeywordEmbedder,
        pubmed: &pubmed,
        scholar: &scholar,
        config: &cfg.papers,
    };

    let result = feeder.run("knee exercise", false).await;
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert!(!result.cached);
    assert_eq!(result.pmids_found, 2);
    assert_eq!(result.papers_stored, 1);
    assert!(result.chunks_stored >= 2, "chunks: {}", result.chunks_stored);

    let rows: Vec<(String, i64, Option<String>, String)> = sqlx::query_as(
        "SELECT pmid, citation_count, tldr, created_at FROM paper_chunks WHERE embedding IS NOT NULL",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), result.chunks_stored);
    for (pmid, citations, tldr, created_at) in &rows {
        assert_eq!(pmid, "4001");
        assert_eq!(*citations, 42);
        assert_eq!(tldr.as_deref(), Some("Strength work helps knees."));
        assert!(!created_at.is_empty());
    }

    // The stored knee chunks now answer the same query without PubMed.
    let again = feeder.run("knee exercise", false).await;
    assert!(again.cached);
    assert_eq!(up.esearch_calls.load(Ordering::SeqCst), 1);

    // Skipping the cache refetches and replaces rather than duplicates.
    let forced = feeder.run("knee exercise", true).await;
    assert!(!forced.cached);
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paper_chunks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total as usize, forced.chunks_stored);
}

#[tokio::test]
async fn test_pubmed_cache_and_spacing() {
    let tmp = TempDir::new().unwrap();
    let up = Arc::new(Upstream::default());
    let base = spawn_upstream(up.clone()).await;
    let cfg = test_config(&tmp, &base);
    let pubmed = PubMedClient::new(&cfg.apis, &cfg.papers).unwrap();

    let started = Instant::now();
    let first = pubmed.search_with_cache("Knee  Pain", 5).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].title, "Knee exercise trial");

    // Same normalised query within the TTL is served from memory.
    let second = pubmed.search_with_cache("knee pain", 5).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(up.esearch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(up.efetch_calls.load(Ordering::SeqCst), 1);

    pubmed.search_with_cache("hip pain", 5).await.unwrap();
    assert_eq!(up.esearch_calls.load(Ordering::SeqCst), 2);

    // Four upstream requests leave at least three rate-limit gaps.
    assert!(started.elapsed() >= RATE_LIMIT * 3 - Duration::from_millis(20));
}

// ─── Retrieval ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_vector_search_over_stored_embeddings() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, "http://127.0.0.1:9");
    let pool = test_pool(&cfg).await;

    papers::replace_paper(
        &pool,
        "5001",
        &[stored_chunk("Knee rehab", "Knee rehabilitation after surgery.")],
    )
    .await
    .unwrap();
    papers::replace_paper(
        &pool,
        "5002",
        &[stored_chunk("Sleep study", "Sleep loss impairs recovery.")],
    )
    .await
    .unwrap();

    let hits = papers::search_papers(&pool, &KeywordEmbedder, "knee", 0.5, 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].pmid, "5001");
    // A cosine score, not a keyword match count.
    assert!(hits[0].similarity > 0.99 && hits[0].similarity <= 1.0001);

    let direct = papers::vector_search(&pool, &keyword_vector("knee sleep"), 0.0, 5)
        .await
        .unwrap();
    assert_eq!(direct.len(), 2);
    assert!((direct[0].similarity - direct[1].similarity).abs() < 1e-6);

    let strict = papers::vector_search(&pool, &keyword_vector("knee"), 0.999, 5)
        .await
        .unwrap();
    assert_eq!(strict.len(), 1);
    assert_eq!(strict[0].pmid, "5001");
}

#[tokio::test]
async fn test_vector_search_without_embeddings_fails() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, "http://127.0.0.1:9");
    let pool = test_pool(&cfg).await;

    let mut plain = stored_chunk("Knee rehab", "Knee rehabilitation after surgery.");
    plain.embedding = None;
    papers::replace_paper(&pool, "5001", &[plain]).await.unwrap();

    assert!(papers::vector_search(&pool, &[1.0, 0.0, 0.1], 0.0, 5).await.is_err());
    // search_papers drops to keyword overlap instead.
    let hits = papers::search_papers(&pool, &KeywordEmbedder, "knee surgery", 0.5, 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].similarity, 2.0);
}
