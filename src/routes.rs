//! `/api` handlers.
//!
//! Every handler takes the caller from [`CurrentUser`] and works on the
//! shared pool in [`AppState`]. Storage failures surface as the generic 500
//! from [`AppError`]; handlers return explicit 400/404 errors for bad input.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chat::{ChatRequest, ChatService, MSG_BAD_JSON};
use crate::models::{self, day_of, parse_date, LogCategory};
use crate::server::{
    bad_request, classify_tool_error, forbidden, not_found, unavailable, AppError, AppState, CurrentUser,
};
use crate::group_calendar::{self, Denied};
use crate::{cycle, dni, drugs, health, llm, logs, papers, profile, push, radar, ranking, schedules, scoring};

type ApiResult = Result<Json<Value>, AppError>;

const DRUG_SEARCH_ROWS: u32 = 20;
const REFERENCE_LIMIT: usize = 10;
const LIVE_REFERENCE_LIMIT: usize = 5;
const TLDR_PREVIEW_CHARS: usize = 200;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/health-logs",
            get(list_health_logs)
                .post(create_health_log)
                .put(update_health_log)
                .delete(delete_health_log),
        )
        .route(
            "/api/schedules",
            get(list_schedules).post(save_schedules).delete(delete_schedule),
        )
        .route(
            "/api/cycle-logs",
            get(cycle_overview).post(cycle_action).delete(delete_cycle),
        )
        .route("/api/profile", get(get_profile).post(save_profile))
        .route("/api/push/subscribe", post(subscribe).delete(unsubscribe))
        .route("/api/points", get(points))
        .route("/api/ranking", get(daily_ranking))
        .route("/api/group-calendar", get(get_group_calendar))
        .route("/api/group-calendar/member", get(get_member_calendar))
        .route("/api/fasting", get(fasting))
        .route("/api/radar", get(health_radar))
        .route("/api/drugs/search", get(drug_search))
        .route("/api/drugs/ingredient", get(drug_ingredient))
        .route("/api/dni/check", post(dni_check))
        .route("/api/medical-papers/search", get(paper_search))
        .route("/api/medical-papers/feed", post(paper_feed))
        .route("/api/chat", post(chat))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parses an optional `YYYY-MM-DD` query value.
fn optional_date(value: &Option<String>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    non_empty(value)
        .map(|v| parse_date(v).map_err(|_| bad_request(format!("{} 형식이 올바르지 않습니다.", field))))
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct IdQuery {
    id: Option<String>,
}

// ============ Health logs ============

/// Recomputes points and ranking for the day a log lives on. The log change
/// is already committed, so a failure here is logged rather than returned.
async fn refresh_for(state: &AppState, user_id: &str, logged_at: &str) {
    let Ok(date) = parse_date(day_of(logged_at)) else {
        tracing::warn!(logged_at, "log timestamp has no usable date");
        return;
    };
    if let Err(e) = scoring::refresh_day(&state.pool, &state.config.scoring, user_id, date, today()).await {
        tracing::warn!(user_id, %date, error = %e, "score refresh failed");
    }
}

fn check_logged_at(input: &logs::LogInput) -> Result<(), AppError> {
    match non_empty(&input.logged_at) {
        Some(ts) if models::normalize_timestamp(ts).is_err() => {
            Err(bad_request("기록 시간 형식이 올바르지 않습니다."))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct LogListQuery {
    start_date: Option<String>,
    end_date: Option<String>,
    category: Option<String>,
}

async fn list_health_logs(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<LogListQuery>,
) -> ApiResult {
    let filter = logs::LogFilter {
        start_date: optional_date(&q.start_date, "start_date")?,
        end_date: optional_date(&q.end_date, "end_date")?,
        category: non_empty(&q.category).and_then(LogCategory::parse),
    };
    let data = logs::list_logs(&state.pool, &user_id, &filter).await?;
    let stats = logs::today_stats(&data, today());
    Ok(Json(json!({
        "success": true,
        "total": data.len(),
        "todayStats": stats,
        "data": data,
    })))
}

async fn create_health_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(input): Json<logs::LogInput>,
) -> ApiResult {
    let category = non_empty(&input.category)
        .and_then(LogCategory::parse)
        .ok_or_else(|| bad_request("유효하지 않은 카테고리입니다."))?;
    check_logged_at(&input)?;

    let log = logs::insert_log(&state.pool, &user_id, category, &input).await?;
    tracing::info!(user_id, category = category.as_str(), id = %log.id, "health log recorded");
    refresh_for(&state, &user_id, &log.logged_at).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} 기록이 완료되었습니다.", category.label()),
        "feedback": logs::instant_feedback(category, log.sleep_duration_hours),
        "data": log,
    })))
}

async fn update_health_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<IdQuery>,
    Json(input): Json<logs::LogInput>,
) -> ApiResult {
    let id = non_empty(&q.id).ok_or_else(|| bad_request("수정할 기록 ID가 필요합니다."))?;
    let category = match non_empty(&input.category) {
        Some(c) => Some(LogCategory::parse(c).ok_or_else(|| bad_request("유효하지 않은 카테고리입니다."))?),
        None => None,
    };
    check_logged_at(&input)?;

    let (before, after) = logs::update_log(&state.pool, &user_id, id, category, &input)
        .await?
        .ok_or_else(|| not_found("기록을 찾을 수 없습니다."))?;
    refresh_for(&state, &user_id, &after.logged_at).await;
    if day_of(&before.logged_at) != day_of(&after.logged_at) {
        refresh_for(&state, &user_id, &before.logged_at).await;
    }

    Ok(Json(json!({
        "success": true,
        "message": "기록이 수정되었습니다.",
        "data": after,
    })))
}

async fn delete_health_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<IdQuery>,
) -> ApiResult {
    let id = non_empty(&q.id).ok_or_else(|| bad_request("삭제할 기록 ID가 필요합니다."))?;
    let removed = logs::delete_log(&state.pool, &user_id, id)
        .await?
        .ok_or_else(|| not_found("기록을 찾을 수 없습니다."))?;
    refresh_for(&state, &user_id, &removed.logged_at).await;
    Ok(Json(json!({ "success": true, "message": "기록이 삭제되었습니다." })))
}

// ============ Schedules ============

#[derive(Debug, Default, Deserialize)]
struct CategoryQuery {
    category: Option<String>,
}

async fn list_schedules(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<CategoryQuery>,
) -> ApiResult {
    let data = schedules::list_schedules(&state.pool, &user_id, non_empty(&q.category)).await?;
    Ok(Json(json!({ "success": true, "total": data.len(), "data": data })))
}

#[derive(Debug, Deserialize)]
struct SchedulesBody {
    schedules: Vec<schedules::ScheduleInput>,
}

async fn save_schedules(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<SchedulesBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body.map_err(|_| bad_request("유효하지 않은 데이터입니다."))?;
    let data = schedules::replace_schedules(&state.pool, &user_id, &body.schedules).await?;
    Ok(Json(json!({
        "success": true,
        "message": "스케줄이 저장되었습니다.",
        "data": data,
    })))
}

async fn delete_schedule(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<IdQuery>,
) -> ApiResult {
    let id = non_empty(&q.id).ok_or_else(|| bad_request("삭제할 스케줄 ID가 필요합니다."))?;
    if !schedules::delete_schedule(&state.pool, &user_id, id).await? {
        return Err(not_found("스케줄을 찾을 수 없습니다."));
    }
    Ok(Json(json!({ "success": true, "message": "스케줄이 삭제되었습니다." })))
}

// ============ Cycle ============

#[derive(Debug, Default, Deserialize)]
struct CycleBody {
    action: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    notes: Option<String>,
}

async fn cycle_overview(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> ApiResult {
    let overview = cycle::overview(&state.pool, &user_id, today()).await?;
    let mut body = serde_json::to_value(overview).map_err(anyhow::Error::from)?;
    body["success"] = json!(true);
    Ok(Json(body))
}

async fn cycle_action(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<CycleBody>,
) -> ApiResult {
    match body.action.as_deref() {
        Some("start") => {
            let start = optional_date(&body.start_date, "start_date")?
                .ok_or_else(|| bad_request("시작일을 입력해주세요."))?;
            let data = cycle::start_cycle(&state.pool, &user_id, start, non_empty(&body.notes)).await?;
            Ok(Json(json!({
                "success": true,
                "message": "그날 시작이 기록되었습니다.",
                "data": data,
            })))
        }
        Some("end") => {
            let end = optional_date(&body.end_date, "end_date")?
                .ok_or_else(|| bad_request("종료일을 입력해주세요."))?;
            let data = cycle::end_cycle(&state.pool, &user_id, end)
                .await?
                .ok_or_else(|| not_found("종료할 진행 중인 기록을 찾을 수 없습니다."))?;
            Ok(Json(json!({
                "success": true,
                "message": "그날 종료가 기록되었습니다.",
                "data": data,
            })))
        }
        _ => Err(bad_request("유효하지 않은 요청입니다.")),
    }
}

async fn delete_cycle(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<IdQuery>,
) -> ApiResult {
    let id = non_empty(&q.id).ok_or_else(|| bad_request("삭제할 기록 ID가 필요합니다."))?;
    if !cycle::delete_cycle(&state.pool, &user_id, id).await? {
        return Err(not_found("기록을 찾을 수 없습니다."));
    }
    Ok(Json(json!({ "success": true, "message": "기록이 삭제되었습니다." })))
}

// ============ Profile ============

async fn get_profile(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> ApiResult {
    let profile = profile::get_profile(&state.pool, &user_id).await?;
    Ok(Json(json!({ "profile": profile })))
}

async fn save_profile(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(input): Json<profile::ProfileInput>,
) -> ApiResult {
    optional_date(&input.birth_date, "birth_date")?;
    let data = profile::upsert_profile(&state.pool, &user_id, &input, today()).await?;
    Ok(Json(json!({ "success": true, "data": data })))
}

// ============ Push ============

async fn subscribe(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
    Json(input): Json<push::SubscriptionInput>,
) -> ApiResult {
    let sub = input
        .validate()
        .ok_or_else(|| bad_request("유효하지 않은 구독 정보입니다."))?;
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    push::subscribe(&state.pool, &user_id, &sub, user_agent).await?;
    Ok(Json(json!({ "success": true, "message": "푸시 알림 구독이 완료되었습니다." })))
}

#[derive(Debug, Default, Deserialize)]
struct EndpointQuery {
    endpoint: Option<String>,
}

async fn unsubscribe(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<EndpointQuery>,
) -> ApiResult {
    let removed = push::unsubscribe(&state.pool, &user_id, non_empty(&q.endpoint)).await?;
    tracing::info!(user_id, removed, "push subscriptions removed");
    Ok(Json(json!({ "success": true, "message": "푸시 알림 구독이 해제되었습니다." })))
}

// ============ Points, ranking, fasting, radar ============

async fn points(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> ApiResult {
    let today = today();
    let record = scoring::get_or_init_points(&state.pool, &user_id, today).await?;
    let view = scoring::points_view(&record, today, &state.config.scoring);
    Ok(Json(serde_json::to_value(view).map_err(anyhow::Error::from)?))
}

#[derive(Debug, Default, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn daily_ranking(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<DateQuery>,
) -> ApiResult {
    let date = optional_date(&q.date, "date")?.unwrap_or_else(today);
    let response = ranking::daily_ranking(&state.pool, &user_id, date).await?;
    Ok(Json(serde_json::to_value(response).map_err(anyhow::Error::from)?))
}

// ============ Group calendar ============

#[derive(Debug, Default, Deserialize)]
struct GroupCalendarQuery {
    group_id: Option<String>,
    member_chart_number: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

/// Both ends of the range are required; `start` may not follow `end`.
fn calendar_range(q: &GroupCalendarQuery) -> Result<(NaiveDate, NaiveDate), AppError> {
    let start = optional_date(&q.start_date, "start_date")?;
    let end = optional_date(&q.end_date, "end_date")?;
    let (Some(start), Some(end)) = (start, end) else {
        return Err(bad_request("start_date, end_date가 필요합니다."));
    };
    if start > end {
        return Err(bad_request("start_date는 end_date보다 늦을 수 없습니다."));
    }
    Ok((start, end))
}

fn denied(reason: Denied) -> AppError {
    if reason.is_missing() {
        not_found(reason.message())
    } else {
        forbidden(reason.message())
    }
}

async fn get_group_calendar(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<GroupCalendarQuery>,
) -> ApiResult {
    let group_id = non_empty(&q.group_id)
        .ok_or_else(|| bad_request("group_id, start_date, end_date가 필요합니다."))?;
    let (start, end) = calendar_range(&q)?;
    let calendar = group_calendar::group_calendar(&state.pool, &user_id, group_id, start, end)
        .await?
        .map_err(denied)?;
    Ok(Json(serde_json::to_value(calendar).map_err(anyhow::Error::from)?))
}

async fn get_member_calendar(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(q): Query<GroupCalendarQuery>,
) -> ApiResult {
    let member = non_empty(&q.member_chart_number)
        .ok_or_else(|| bad_request("member_chart_number, start_date, end_date가 필요합니다."))?;
    let (start, end) = calendar_range(&q)?;
    let calendar = group_calendar::member_calendar(&state.pool, &user_id, member, start, end)
        .await?
        .map_err(denied)?;
    Ok(Json(serde_json::to_value(calendar).map_err(anyhow::Error::from)?))
}

async fn fasting(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> ApiResult {
    let last_meal = logs::last_meal_at(&state.pool, &user_id).await?;
    let now = Local::now().naive_local();
    let hours = health::fasting_hours(last_meal.as_deref().and_then(models::parse_timestamp), now);
    Ok(Json(json!({
        "hours": hours,
        "message": hours.map(health::fasting_message),
        "lastMealAt": last_meal,
    })))
}

async fn health_radar(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> ApiResult {
    let stored = profile::get_profile(&state.pool, &user_id).await?;
    let today = today();
    let input = match &stored {
        Some(p) => radar::RadarInput {
            age: profile::effective_age(p, today),
            ..radar::RadarInput::from(p)
        },
        None => radar::RadarInput::default(),
    };
    let report = radar::report(&input);
    Ok(Json(serde_json::to_value(report).map_err(anyhow::Error::from)?))
}

// ============ Drugs and DNI ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrugSearchQuery {
    item_name: Option<String>,
}

async fn drug_search(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(q): Query<DrugSearchQuery>,
) -> ApiResult {
    let item_name = non_empty(&q.item_name)
        .ok_or_else(|| bad_request("itemName 쿼리 필수 (예: ?itemName=타이레놀)"))?;
    let mfds = state
        .clients
        .mfds
        .as_ref()
        .ok_or_else(|| unavailable("MFDS API key is not configured"))?;

    let items = mfds
        .easy_drug_list(item_name, 1, DRUG_SEARCH_ROWS)
        .await
        .map_err(|e| classify_tool_error("drugs/search", e))?;
    let mut body = json!({ "totalCount": items.len(), "items": items });
    match drugs::save_easy_drugs(&state.pool, &items).await {
        Ok(saved) => body["saved"] = json!(saved),
        Err(e) => {
            tracing::warn!(item_name, error = %e, "saving e-drug rows failed");
            body["saved"] = json!(0);
            body["saveError"] = json!(e.to_string());
        }
    }
    Ok(Json(body))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngredientQuery {
    product_name: Option<String>,
}

async fn drug_ingredient(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(q): Query<IngredientQuery>,
) -> ApiResult {
    let product_name = non_empty(&q.product_name)
        .ok_or_else(|| bad_request("productName 쿼리 필수 (예: ?productName=타이레놀)"))?;
    let lookup = drugs::ingredient_lookup(&state.pool, state.clients.mfds.as_ref(), product_name)
        .await
        .map_err(|e| classify_tool_error("drugs/ingredient", e))?;
    Ok(Json(serde_json::to_value(lookup).map_err(anyhow::Error::from)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DniBody {
    #[serde(default)]
    food_names: Vec<Value>,
}

async fn dni_check(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<DniBody>, JsonRejection>,
) -> ApiResult {
    let names: Vec<String> = body
        .map(|Json(b)| b.food_names)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .take(dni::MAX_FOODS)
        .collect();
    if names.is_empty() {
        return Err(bad_request("foodNames 배열 필수 (예: [\"바나나\", \"시금치\"])"));
    }

    let Some(usda) = state.clients.usda.as_ref() else {
        return Ok(Json(json!({
            "hasConflict": false,
            "cautionGuideMessage": null,
            "conflicts": [],
            "error": "USDA API 키 미설정",
        })));
    };

    let mut items = Vec::new();
    for name in &names {
        match usda.search_and_get_nutrients(name, 1).await {
            Ok(found) => items.extend(found),
            Err(e) => tracing::warn!(food = %name, error = %e, "USDA lookup failed"),
        }
    }
    let result = dni::infer(&state.pool, &user_id, &items).await?;
    Ok(Json(serde_json::to_value(result).map_err(anyhow::Error::from)?))
}

// ============ Medical papers ============

#[derive(Debug, Default, Deserialize)]
struct PaperQuery {
    query: Option<String>,
}

fn preview(text: &str) -> String {
    if text.chars().count() > TLDR_PREVIEW_CHARS {
        format!("{}...", crate::http::truncate_chars(text, TLDR_PREVIEW_CHARS))
    } else {
        text.to_string()
    }
}

async fn paper_search(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(q): Query<PaperQuery>,
) -> ApiResult {
    let query = non_empty(&q.query).ok_or_else(|| bad_request("query 파라미터 필요"))?;

    if state.clients.pubmed.has_key() {
        let translated =
            llm::translate_to_pubmed_query(state.clients.providers.openai.as_ref(), query).await;
        let found = state
            .clients
            .pubmed
            .search_with_cache(&translated, LIVE_REFERENCE_LIMIT)
            .await
            .map_err(|e| classify_tool_error("pubmed", e))?;
        let references: Vec<Value> = found
            .iter()
            .map(|p| {
                json!({
                    "pmid": p.pmid,
                    "title": p.title,
                    "authors": p.authors,
                    "abstract": p.r#abstract,
                    "citation_count": 0,
                    "tldr": preview(&p.r#abstract),
                })
            })
            .collect();
        return Ok(Json(json!({ "success": true, "references": references, "source": "pubmed" })));
    }

    let chunks = papers::search_papers(
        &state.pool,
        state.clients.embedder.as_ref(),
        query,
        state.config.papers.match_threshold,
        REFERENCE_LIMIT,
    )
    .await?;
    let mut seen = std::collections::HashSet::new();
    let references: Vec<Value> = chunks
        .iter()
        .filter(|c| {
            let key = if c.pmid.is_empty() { &c.title } else { &c.pmid };
            seen.insert(key.clone())
        })
        .map(|c| {
            let pmid = (!papers::is_pseudo_pmid(&c.pmid) && !c.pmid.is_empty()).then_some(&c.pmid);
            let text = if c.chunk_text.is_empty() {
                c.r#abstract.clone().unwrap_or_default()
            } else {
                c.chunk_text.clone()
            };
            json!({
                "pmid": pmid,
                "title": c.title,
                "authors": "",
                "abstract": text,
                "citation_count": c.citation_count,
                "tldr": c.tldr,
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "references": references, "source": "rag" })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedBody {
    query: Option<String>,
    #[serde(default)]
    skip_cache: bool,
}

async fn paper_feed(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(body): Json<FeedBody>,
) -> ApiResult {
    let query = non_empty(&body.query).ok_or_else(|| bad_request("query 필드 필요"))?;
    let result = state
        .clients
        .feeder(&state.pool, &state.config)
        .run(query, body.skip_cache)
        .await;
    let mut value = serde_json::to_value(result).map_err(anyhow::Error::from)?;
    value["success"] = json!(true);
    Ok(Json(value))
}

// ============ Chat ============

async fn chat(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": MSG_BAD_JSON }))).into_response();
    };
    let service = ChatService {
        pool: &state.pool,
        config: &state.config,
        clients: &state.clients,
    };
    let outcome = match ChatRequest::from_json(&body, state.config.chat.history_limit) {
        Ok(request) => service.respond(&user_id, request, today()).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            if let crate::chat::ChatError::Internal(cause) = &e {
                tracing::error!(error = %cause, "chat failed");
            }
            let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(e.body())).into_response()
        }
    }
}
