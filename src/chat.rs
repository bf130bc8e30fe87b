//! The assistant's chat pipeline.
//!
//! ```text
//! request ─▶ daily limit ─▶ profile + 7-day summary
//!                              │
//!      ┌──────────────┬────────┴───────┬──────────────┐
//!      ▼              ▼                ▼              ▼
//!  food RAG ──▶ DNI  drug RAG      paper RAG     intent flags
//!      └──────────────┴────────┬───────┴──────────────┘
//!                              ▼
//!                 system prompt ─▶ provider ─▶ {answer, papers}
//! ```
//!
//! Every retrieval stage degrades to "no context" on failure. Only a
//! missing or failing completion provider fails the request.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::aggregator;
use crate::clients::Clients;
use crate::config::Config;
use crate::dni;
use crate::drugs::{self, DrugRagResult};
use crate::food_knowledge;
use crate::http::truncate_chars;
use crate::intent::{self, AmbiguousHint};
use crate::llm::{self, ChatMessage, ChatProvider, Generation, Providers};
use crate::models::{format_date, PaperChunk};
use crate::papers;
use crate::profile;
use crate::pubmed;
use crate::usda;

/// Chunks requested from paper retrieval per message.
pub const PAPER_LIMIT: usize = 5;
/// References returned to the client.
pub const SIDEBAR_LIMIT: usize = 3;
const FOOD_KNOWLEDGE_LIMIT: i64 = 5;
const USDA_MAX_FOODS: usize = 2;
const FALLBACK_QUERY_CHARS: usize = 40;

pub const MSG_MISSING_MESSAGE: &str = "메시지가 필요합니다";
pub const MSG_BAD_JSON: &str = "JSON 형식 오류";
pub const MSG_NO_PROVIDER: &str =
    "AI 서비스 API 키가 설정되지 않았습니다. OPENAI_API_KEY 또는 ANTHROPIC_API_KEY를 설정해주세요.";
pub const MSG_PROVIDER_FAILED: &str = "AI 응답 생성에 실패했습니다.";
pub const MSG_INTERNAL: &str = "서버 오류가 발생했습니다.";

// ============ Request / response ============

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RecentAction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<ChatMessage>,
    /// `None` when the client sent neither `recentActions` nor `hesitationHint`.
    pub app_context: Option<AppContext>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppContext {
    pub recent_actions: Vec<RecentAction>,
    pub hesitation_hint: bool,
}

impl ChatRequest {
    /// Lenient parse of the request body: malformed history entries and
    /// actions are dropped rather than rejected.
    pub fn from_json(body: &Value, history_limit: usize) -> Result<Self, ChatError> {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .ok_or(ChatError::BadRequest(MSG_MISSING_MESSAGE))?
            .to_string();

        let history: Vec<ChatMessage> = body
            .get("history")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| serde_json::from_value::<ChatMessage>(m.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        let skip = history.len().saturating_sub(history_limit);
        let history = history.into_iter().skip(skip).collect();

        let actions = body.get("recentActions").and_then(Value::as_array);
        let hesitation = body.get("hesitationHint").and_then(Value::as_bool);
        let app_context = (actions.is_some() || hesitation.is_some()).then(|| AppContext {
            recent_actions: actions
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|a| serde_json::from_value(a.clone()).ok())
                        .collect()
                })
                .unwrap_or_default(),
            hesitation_hint: hesitation.unwrap_or(false),
        });

        Ok(Self {
            message,
            history,
            app_context,
            user_name: body
                .get("userName")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }
}

/// Reference card shown under the answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SidebarPaper {
    pub title: String,
    pub pmid: String,
    pub url: String,
    pub journal: String,
    pub r#abstract: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub papers: Vec<SidebarPaper>,
}

#[derive(Debug)]
pub enum ChatError {
    BadRequest(&'static str),
    DailyLimit { limit: i64, count: i64 },
    NoProvider,
    ProviderFailed,
    Internal(anyhow::Error),
}

impl ChatError {
    pub fn status(&self) -> u16 {
        match self {
            ChatError::BadRequest(_) => 400,
            ChatError::DailyLimit { .. } => 429,
            ChatError::NoProvider | ChatError::Internal(_) => 500,
            ChatError::ProviderFailed => 502,
        }
    }

    /// JSON body in the chat endpoint's own error shape.
    pub fn body(&self) -> Value {
        match self {
            ChatError::BadRequest(msg) => serde_json::json!({ "error": msg }),
            ChatError::DailyLimit { limit, count } => serde_json::json!({
                "error": format!("일일 사용 제한({}회)을 초과했습니다.", limit),
                "dailyLimit": true,
                "count": count,
            }),
            ChatError::NoProvider => serde_json::json!({ "error": MSG_NO_PROVIDER }),
            ChatError::ProviderFailed => serde_json::json!({ "error": MSG_PROVIDER_FAILED }),
            ChatError::Internal(_) => serde_json::json!({ "error": MSG_INTERNAL }),
        }
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(e: anyhow::Error) -> Self {
        ChatError::Internal(e)
    }
}

// ============ Daily usage ============

pub async fn usage_count(pool: &SqlitePool, user_id: &str, date: NaiveDate) -> anyhow::Result<i64> {
    let count: Option<i64> =
        sqlx::query_scalar("SELECT count FROM chat_usage WHERE user_id = ? AND usage_date = ?")
            .bind(user_id)
            .bind(format_date(date))
            .fetch_optional(pool)
            .await?;
    Ok(count.unwrap_or(0))
}

pub async fn increment_usage(pool: &SqlitePool, user_id: &str, date: NaiveDate) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO chat_usage (user_id, usage_date, count) VALUES (?, ?, 1)
        ON CONFLICT(user_id, usage_date) DO UPDATE SET count = chat_usage.count + 1
        RETURNING count
        "#,
    )
    .bind(user_id)
    .bind(format_date(date))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

// ============ Retrieval stages ============

#[derive(Debug, Default)]
pub struct FoodRag {
    pub usda_context: Option<String>,
    pub knowledge_context: Option<String>,
    pub dni_guide: Option<String>,
}

async fn run_food_rag(pool: &SqlitePool, clients: &Clients, user_id: &str, query: &str) -> FoodRag {
    let use_usda = intent::is_likely_food_name(query);
    let usda_client = clients.usda.as_ref().filter(|_| use_usda);
    if use_usda && usda_client.is_none() {
        tracing::warn!("USDA key not configured; skipping nutrient lookup");
    }

    let knowledge = food_knowledge::search(pool, query, FOOD_KNOWLEDGE_LIMIT);
    let nutrients = async {
        match usda_client {
            Some(client) => client
                .search_and_get_nutrients(query, USDA_MAX_FOODS)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "USDA lookup failed");
                    Vec::new()
                }),
            None => Vec::new(),
        }
    };
    let (rows, items) = tokio::join!(knowledge, nutrients);
    let rows = rows.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "food_knowledge lookup failed");
        Vec::new()
    });

    let mut rag = FoodRag::default();
    if !items.is_empty() {
        rag.usda_context = Some(usda::format_for_prompt(&items));
        match dni::infer(pool, user_id, &items).await {
            Ok(result) if result.has_conflict => {
                tracing::info!(conflicts = result.conflicts.len(), "DNI conflicts found");
                rag.dni_guide = result.caution_guide_message;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "DNI inference failed"),
        }
    }
    if !rows.is_empty() {
        rag.knowledge_context = Some(food_knowledge::format_for_prompt(&rows));
    }
    tracing::debug!(
        query,
        usda = items.len(),
        knowledge = rows.len(),
        "food context gathered"
    );
    rag
}

#[derive(Debug, Default)]
pub struct PaperRag {
    pub chunks: Vec<PaperChunk>,
    pub sidebar: Vec<SidebarPaper>,
}

/// Abstract preview used as the TLDR of a live PubMed hit.
fn abstract_preview(text: &str) -> String {
    let head = truncate_chars(text, 300);
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}

pub fn live_results(found: Vec<pubmed::PubMedPaper>) -> PaperRag {
    let mut rag = PaperRag::default();
    for p in found {
        let abstract_text = Some(p.r#abstract.clone()).filter(|a| !a.is_empty());
        rag.chunks.push(PaperChunk {
            id: p.pmid.clone(),
            pmid: p.pmid.clone(),
            title: p.title.clone(),
            tldr: abstract_text.as_deref().map(abstract_preview),
            chunk_text: abstract_text.clone().unwrap_or_else(|| p.title.clone()),
            r#abstract: abstract_text,
            citation_count: 0,
            similarity: 0.0,
        });
        rag.sidebar.push(SidebarPaper {
            title: p.title,
            pmid: p.pmid,
            url: p.url,
            journal: String::new(),
            r#abstract: p.r#abstract,
        });
    }
    rag
}

pub fn stored_results(chunks: Vec<PaperChunk>) -> PaperRag {
    let sidebar = chunks
        .iter()
        .map(|c| SidebarPaper {
            title: c.title.clone(),
            pmid: c.pmid.clone(),
            url: if c.pmid.is_empty() {
                String::new()
            } else {
                pubmed::paper_url(&c.pmid)
            },
            journal: String::new(),
            r#abstract: c.r#abstract.clone().unwrap_or_default(),
        })
        .collect();
    PaperRag { chunks, sidebar }
}

/// Live PubMed when a key is configured, otherwise the local chunk store.
pub async fn run_paper_rag(
    pool: &SqlitePool,
    config: &Config,
    clients: &Clients,
    message: &str,
    limit: usize,
) -> PaperRag {
    if !clients.pubmed.has_key() {
        return match papers::search_papers(
            pool,
            clients.embedder.as_ref(),
            message,
            config.papers.match_threshold,
            limit,
        )
        .await
        {
            Ok(chunks) => stored_results(chunks),
            Err(e) => {
                tracing::warn!(error = %e, "stored paper search failed");
                PaperRag::default()
            }
        };
    }

    let translated = llm::translate_to_pubmed_query(clients.providers.openai.as_ref(), message).await;
    let query = if translated.is_empty() { message } else { translated.as_str() };
    tracing::debug!(query, "PubMed query");
    match clients.pubmed.search_with_cache(query, limit).await {
        Ok(found) => live_results(found),
        Err(e) => {
            tracing::warn!(error = %e, "PubMed lookup failed");
            PaperRag::default()
        }
    }
}

// ============ System prompt ============

const PERSONA: &str = r#"## [최우선 — 15년 차 베테랑 물리치료사의 임상 상담 스타일]

### 페르소나 및 화법
- 너는 환자의 아픔을 내 아픔처럼 느끼는 **15년 차 재활 전문 물리치료사**야.
- 사용자의 상황(직업·나이·생활)을 즉시 반영한 **공감으로 시작**해. "최근 연구에 따르면~" 같은 학술적 도입은 금지.
- 논문은 대화의 **배경**으로만 쓰고, 출처는 상담이 끝난 뒤 화면 맨 하단에만 표시돼. 본문 중간에 링크·출처 목록 금지.
- 인용은 "이러한 관리가 왜 필요한지 연구 결과(PMID: XXXXXX)가 뒷받침해 주고 있어요"처럼 문맥을 먼저 말한 뒤 PMID를 이어 줘.

### 금지 사항
- 1., ①, **1단계** 같은 번호·단계 표기, 불릿·하이픈·별표 목록, [안정화 단계] 같은 대괄호 제목을 쓰지 마.
- 한자를 직접 쓰지 말고 어려운 한자어는 쉬운 우리말로 풀어 써.
- 운동·스트레칭 이름은 정확한 우리말 또는 통용어만 사용해.
- 구어체 산문만 쓰고 연결어(무엇보다, 아울러, 특히, 그다음으로)로 흐름을 이어 가. 말투는 ~해요, ~입니다, ~네요. 표 금지.

## 의료법 준수
- '치료', '회복', '진단', '완치' 사용 금지. '관리', '기능 강화', '가이드', '상담' 등만 써.

## 사용자 데이터 연동
- 생년월일로 **만 나이**를 계산해 답변 전체에 연령에 맞게 반영해.
- 생년월일이 없으면 일반 가이드를 주고, 연령대를 한 번만 여쭤볼 수 있어.

## 상담 흐름
먼저 원인과 메커니즘을 쉬운 말로 풀어 주고, 아울러 생활 속에서 바로 할 수 있는 관리를 건네. 특히 구체적인 요리명으로 영양과 휴식을 추천하고(브랜드명 금지), 집중 관리 기간은 원인과 심각도에 따라 달리 안내해(가벼우면 1~2주, 급성 2~4주, 만성 6~12주). 마지막에 안전 가이드와 상태 확인을 위한 다정한 질문 하나로 마무리해.

## 논문·데이터
- 논문 데이터가 주어지면 그 내용을 요약해 친절히 설명해. 검색된 논문만 근거로 삼아.
- 유저가 새 주제를 꺼내면 새 주제만 답해.
- 최근 건강 기록(수면·운동·식단·복약)이 있으면 반영하고, 특이점이 보이면 먼저 언급해.
- 특정 병원명은 언급하지 마.
"#;

/// Everything the system prompt is assembled from.
#[derive(Debug, Default)]
pub struct PromptParts<'a> {
    pub display_name: &'a str,
    pub use_haiku: bool,
    pub ambiguous: Option<&'a AmbiguousHint>,
    /// Rendered by [`profile::format_for_prompt`].
    pub profile_block: &'a str,
    pub health_summary: Option<&'a str>,
    pub app_context: Option<&'a AppContext>,
    pub papers: &'a [PaperChunk],
    pub usda_context: Option<&'a str>,
    pub food_knowledge: Option<&'a str>,
    pub dni_guide: Option<&'a str>,
    pub drug_context: Option<&'a str>,
    pub drug_query_missing: bool,
}

fn fenced(heading: &str, body: &str) -> String {
    format!("\n{}\n```\n{}\n```\n", heading, body)
}

fn ambiguity_block(hint: &AmbiguousHint) -> String {
    let mut out = String::from("\n## [다중 의미 단어 확인] (고정 로직 — 건너뛰지 말 것)\n");
    out.push_str("사용자 질문에 **모호한 키워드**가 포함되어 있음. 본문 답변을 하기 **전에** 반드시 확인 질문을 먼저 해.\n\n");
    for t in &hint.terms {
        out.push_str(&format!("- **\"{}\"**: {} vs {}\n", t.term, t.meaning_a, t.meaning_b));
    }
    out.push_str("\n### PT 고정 로직 (필수)\n");
    out.push_str("사용자가 **'PT'**를 언급하면 답변 전에 반드시 \"병원에서 받으시는 물리치료를 말씀하시는 걸까요, 아니면 헬스장에서의 개인 운동(웨이트 트레이닝)을 말씀하시는 걸까요?\"라고 다정하게 먼저 물어본 뒤 맥락에 맞게 답변을 이어 가.\n");
    out.push_str("다른 모호어(OT, Diet, Conditioning)도 답변 서두에 \"정확한 도움을 드리고 싶은 마음에 먼저 여쭤보게 되었어요.\" 같은 배려 문구로 확인해.\n\n");
    if hint.has_medical_context {
        out.push_str("### 맥락: 병원·의사·처방 등이 언급됨 → 의료 의미로 우선 판단\n");
        out.push_str("\"병원에서 권유받으신 만큼 물리치료(또는 해당 의미)를 중심으로 설명해 드릴게요\"라고 명시한 뒤 해당 의미로 답변해.\n\n");
    } else {
        out.push_str("### 맥락: 불분명 → 두 가지 경우 모두 고려\n");
        out.push_str("두 가지 의미의 핵심 관리법을 짧게 요약한 뒤, 사용자의 선택을 유도하는 다정한 문장으로 마무리해.\n\n");
    }
    out
}

pub fn build_system_prompt(parts: &PromptParts) -> String {
    let name = parts.display_name;
    let mut prompt = String::from(PERSONA);

    if let Some(hint) = parts.ambiguous.filter(|h| !h.terms.is_empty()) {
        prompt.push_str(&ambiguity_block(hint));
    }

    if parts.use_haiku {
        prompt.push_str(&format!(
            "\n## 공감 모드 (필수)\n- **답변 첫 문장은 반드시 \"{name}님\"을 부르며 시작해.** 예: \"{name}님, 많이 불편하셨겠어요.\"\n- 마지막에는 상태 확인을 위한 **질문 1개**로 대화체로 마무리해. 번호·표 사용 금지.\n"
        ));
    }

    prompt.push('\n');
    prompt.push_str(parts.profile_block);

    if let Some(summary) = parts.health_summary {
        prompt.push_str(&fenced("## 최신 건강 상태 요약 (최근 7일)", summary));
    }

    if let Some(ctx) = parts.app_context {
        if !ctx.recent_actions.is_empty() {
            let lines: Vec<String> = ctx
                .recent_actions
                .iter()
                .map(|a| match a.detail.as_deref().filter(|d| !d.is_empty()) {
                    Some(detail) => format!("- {} ({})", a.label, detail),
                    None => format!("- {}", a.label),
                })
                .collect();
            prompt.push_str(&format!("\n## 앱 내 최근 행동\n{}\n\n", lines.join("\n")));
        }
        if ctx.hesitation_hint {
            prompt.push_str("\n선생님이 최근 기록 없이 대시보드를 오래 보셨을 수 있습니다. \"기록에 어려움이 있으신가요?\" 같은 제안을 할 수 있습니다.\n\n");
        }
    }

    if !parts.papers.is_empty() {
        prompt.push_str(&fenced(
            "## [필수] 학술 논문 — 대화의 배경으로만 사용",
            &papers::format_paper_context(parts.papers),
        ));
        prompt.push_str("위 논문 핵심을 대화 속에 녹여서 설명해. PMID 번호만 던지지 말고 문맥을 먼저 말한 뒤 PMID를 이어 줘. 참고 논문은 상담이 끝난 뒤 하단에 최대 3개만 표시됨.\n\n");
    }

    if let Some(usda) = parts.usda_context {
        prompt.push_str(&fenced("## [필수] USDA 표준 영양 데이터 (100g당, 정밀 수치)", usda));
        prompt.push_str("위 영양 데이터를 인용하는 문장의 맨 앞에 반드시 「USDA 표준 데이터에 따르면~」을 넣어. 단위는 g, mg, kcal만 사용해.\n\n");
    }

    if let Some(food) = parts.food_knowledge {
        prompt.push_str(&fenced("## [참고] 내부 DB — 관리 팁·레시피", food));
        prompt.push_str("위 내용은 식품별 관리 팁·레시피 참고용이야. USDA 수치와 함께 활용해 설명해.\n\n");
    }

    if let Some(guide) = parts.dni_guide {
        prompt.push_str(&fenced("## [필수 — 데이터 기반 주의 가이드]", guide));
        prompt.push_str("위 내용은 확진·진단이 아닌 참고용 가이드야. 답변 말미에 이 주의 가이드를 자연스럽게 포함하고, 필요 시 의료진·약사 상담을 권해.\n\n");
    }

    if let Some(drug) = parts.drug_context {
        prompt.push_str("\n## [필수 — 식약처 의약품 공식 데이터]\n");
        prompt.push_str("아래는 식품의약품안전처(MFDS) 공공데이터에서 가져온 **공식 의약품 정보**야.\n");
        prompt.push_str(&format!("```\n{}\n```\n\n", drug));
        prompt.push_str("### 의약품 답변 필수 규칙\n");
        prompt.push_str("- 일반 지식으로 의약품 정보를 답하지 말고 위 데이터만 근거로 써.\n");
        prompt.push_str("- 효능·용법·주의사항·상호작용은 데이터 원문 그대로 사용해.\n");
        prompt.push_str("- 답변 마지막에 **출처: 식품의약품안전처 공공데이터 (e약은요)** 를 추가해.\n");
        prompt.push_str("- 데이터에 없는 정보는 \"현재 조회된 데이터에는 해당 정보가 없습니다. 복약상담이 필요하시면 약사 선생님께 직접 문의해 주세요.\"라고 안내해.\n");
        prompt.push_str("- 복용 결정·용량 조정은 의사·약사 상담을 권하는 문장으로 마무리해.\n\n");
    } else if parts.drug_query_missing {
        prompt.push_str("\n## [의약품 조회 불가 — 일반 지식 답변 금지]\n");
        prompt.push_str("사용자가 의약품 정보를 물었으나 식약처 공식 데이터를 가져오지 못했어.\n");
        prompt.push_str("- 일반 학습 데이터로 약물 효능·용량·부작용을 답변하지 마.\n");
        prompt.push_str("- 다음 안내만 해: \"죄송합니다. 현재 식약처 의약품 데이터베이스에서 해당 정보를 조회하지 못했어요. 정확한 복약 정보는 약사 선생님이나 식품의약품안전처 의약품통합정보시스템(https://nedrug.mfds.go.kr)에서 확인하시길 권해 드려요.\"\n\n");
    }

    prompt
}

// ============ Provider routing ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Anthropic first; OpenAI is tried when it fails and is configured.
    Claude { fallback: bool },
    OpenAI,
    Unavailable,
}

pub fn choose_route(use_haiku: bool, has_claude: bool, has_openai: bool) -> Route {
    match (has_claude, has_openai) {
        (true, _) if use_haiku || !has_openai => Route::Claude { fallback: has_openai },
        (_, true) => Route::OpenAI,
        _ => Route::Unavailable,
    }
}

async fn generate(
    providers: &Providers,
    route: Route,
    system: &str,
    messages: &[ChatMessage],
    gen: Generation,
) -> Result<String, ChatError> {
    if let (Route::Claude { fallback }, Some(claude)) = (route, providers.anthropic.as_ref()) {
        match claude.complete(system, messages, gen).await {
            Ok(answer) => return Ok(answer),
            Err(e) if fallback => tracing::warn!(error = %e, "Claude failed, falling back to OpenAI"),
            Err(e) => {
                tracing::error!(error = %e, "Claude completion failed");
                return Err(ChatError::ProviderFailed);
            }
        }
    }
    if route == Route::Unavailable {
        return Err(ChatError::NoProvider);
    }
    let Some(openai) = providers.openai.as_ref() else {
        return Err(ChatError::NoProvider);
    };
    openai.complete(system, messages, gen).await.map_err(|e| {
        tracing::error!(error = %e, "OpenAI completion failed");
        ChatError::ProviderFailed
    })
}

// ============ Pipeline ============

pub struct ChatService<'a> {
    pub pool: &'a SqlitePool,
    pub config: &'a Config,
    pub clients: &'a Clients,
}

impl ChatService<'_> {
    pub async fn respond(
        &self,
        user_id: &str,
        request: ChatRequest,
        today: NaiveDate,
    ) -> Result<ChatResponse, ChatError> {
        let limit = self.config.chat.daily_limit;
        let count = usage_count(self.pool, user_id, today).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "chat usage lookup failed");
            0
        });
        if count >= limit {
            tracing::info!(user_id, count, "daily chat limit reached");
            return Err(ChatError::DailyLimit { limit, count });
        }

        let message = request.message.as_str();
        let profile = profile::get_profile(self.pool, user_id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "profile load failed");
            None
        });
        let health_summary = match aggregator::aggregate(self.pool, user_id, today).await {
            Ok(summary) => Some(aggregator::format_for_prompt(&summary)),
            Err(e) => {
                tracing::warn!(error = %e, "health aggregation failed");
                None
            }
        };

        let need_search = intent::is_analysis_request(message);
        let need_food = intent::is_food_or_nutrient_intent(message);
        let need_drug = intent::is_drug_intent(message);
        let fallback_query = || truncate_chars(message, FALLBACK_QUERY_CHARS).trim().to_string();
        let food_query = need_food
            .then(|| intent::extract_food_search_query(message).unwrap_or_else(fallback_query))
            .filter(|q| !q.is_empty());
        let drug_query = need_drug
            .then(|| intent::extract_drug_search_query(message).unwrap_or_else(fallback_query))
            .filter(|q| !q.is_empty());
        tracing::info!(
            analysis = need_search,
            food = food_query.as_deref().unwrap_or(""),
            drug = drug_query.as_deref().unwrap_or(""),
            "chat intent"
        );

        let food = match &food_query {
            Some(q) => run_food_rag(self.pool, self.clients, user_id, q).await,
            None => FoodRag::default(),
        };

        let mut drug_query_missing = false;
        let drug: Option<DrugRagResult> = match &drug_query {
            Some(q) => {
                let result = drugs::run_drug_rag(self.pool, self.clients.mfds.as_ref(), q).await;
                drug_query_missing = result.drug_context.is_none();
                Some(result)
            }
            None => None,
        };

        let paper_rag = if need_search || need_food {
            run_paper_rag(self.pool, self.config, self.clients, message, PAPER_LIMIT).await
        } else {
            PaperRag::default()
        };

        let use_haiku = intent::should_use_haiku(message);
        let ambiguous = intent::detect_ambiguous_terms(message);
        let profile_block = profile::format_for_prompt(profile.as_ref(), today);
        let display_name = request
            .user_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("선생님");

        let system = build_system_prompt(&PromptParts {
            display_name,
            use_haiku,
            ambiguous: ambiguous.as_ref(),
            profile_block: &profile_block,
            health_summary: health_summary.as_deref(),
            app_context: request.app_context.as_ref(),
            papers: &paper_rag.chunks,
            usda_context: food.usda_context.as_deref(),
            food_knowledge: food.knowledge_context.as_deref(),
            dni_guide: food.dni_guide.as_deref(),
            drug_context: drug.as_ref().and_then(|d| d.drug_context.as_deref()),
            drug_query_missing,
        });

        let mut messages = request.history;
        messages.push(ChatMessage::user(message));
        let providers = &self.clients.providers;
        let route = choose_route(use_haiku, providers.anthropic.is_some(), providers.openai.is_some());
        tracing::info!(
            prompt_chars = system.chars().count(),
            papers = paper_rag.chunks.len(),
            turns = messages.len(),
            ?route,
            "calling completion provider"
        );

        let gen = Generation {
            max_tokens: self.config.chat.max_tokens,
            temperature: None,
        };
        let answer = generate(providers, route, &system, &messages, gen).await?;

        if let Err(e) = increment_usage(self.pool, user_id, today).await {
            tracing::warn!(error = %e, "chat usage increment failed");
        }
        if let Some(result) = &drug {
            if let Err(e) = drugs::save_drug_rag_results(self.pool, result, Some(&answer)).await {
                tracing::warn!(error = %e, "saving drug lookup results failed");
            }
        }

        let mut papers = paper_rag.sidebar;
        papers.truncate(SIDEBAR_LIMIT);
        Ok(ChatResponse { answer, papers })
    }
}
