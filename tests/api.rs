//! HTTP tests for the `/api` routes.
//!
//! Each test serves the full router on an ephemeral port backed by a fresh
//! SQLite file, then talks to it with reqwest the way the mobile client does.

use chrono::Local;
use docent::config::Config;
use docent::server::{router, AppState};
use docent::{db, migrate};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

struct TestApp {
    base: String,
    client: Client,
    pool: SqlitePool,
    _tmp: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn get(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).header("x-user-id", user)
    }

    fn post(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).header("x-user-id", user)
    }

    fn delete(&self, user: &str, path: &str) -> reqwest::RequestBuilder {
        self.client.delete(self.url(path)).header("x-user-id", user)
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with("").await
}

async fn spawn_app_with(extra_toml: &str) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let content = format!(
        r#"
[db]
path = "{}"
{}
"#,
        tmp.path().join("docent.sqlite").display(),
        extra_toml
    );
    let cfg: Config = toml::from_str(&content).unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let state = AppState::new(cfg, pool.clone()).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestApp {
        base: format!("http://{}", addr),
        client: Client::new(),
        pool,
        _tmp: tmp,
    }
}

async fn json_of(resp: reqwest::Response) -> Value {
    resp.json().await.unwrap()
}

// ─── Server basics ──────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_login_required() {
    let app = spawn_app().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["status"], "ok");

    let resp = app.client.get(app.url("/api/health-logs")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_of(resp).await;
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(body["error"]["message"], "로그인이 필요합니다.");

    let resp = app
        .client
        .get(app.url("/api/points"))
        .header("x-user-id", "   ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ─── Health logs and points ─────────────────────────────────────────

#[tokio::test]
async fn test_health_log_lifecycle_updates_points() {
    let app = spawn_app().await;

    let resp = app
        .post("u1", "/api/health-logs")
        .json(&json!({ "category": "meal", "meal_description": "현미밥" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_of(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "식사 기록이 완료되었습니다.");
    assert!(body["feedback"].as_str().unwrap().starts_with("식사 기록"));

    let resp = app
        .post("u1", "/api/health-logs")
        .json(&json!({ "category": "exercise", "duration_minutes": 30 }))
        .send()
        .await
        .unwrap();
    let exercise_id = json_of(resp).await["data"]["id"].as_str().unwrap().to_string();

    let body = json_of(app.get("u1", "/api/health-logs").send().await.unwrap()).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["todayStats"]["meal"], 1);
    assert_eq!(body["todayStats"]["exercise"], 1);

    let body = json_of(
        app.get("u1", "/api/health-logs?category=meal")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["total"], 1);

    let points = json_of(app.get("u1", "/api/points").send().await.unwrap()).await;
    assert_eq!(points["daily_points"], 4);
    assert_eq!(points["annual_points"], 4);

    // Another user can't delete it
    let resp = app
        .delete("u2", &format!("/api/health-logs?id={}", exercise_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .delete("u1", &format!("/api/health-logs?id={}", exercise_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["message"], "기록이 삭제되었습니다.");

    let points = json_of(app.get("u1", "/api/points").send().await.unwrap()).await;
    assert_eq!(points["daily_points"], 1);
    assert_eq!(points["annual_points"], 1);
}

#[tokio::test]
async fn test_health_log_validation() {
    let app = spawn_app().await;

    let resp = app
        .post("u1", "/api/health-logs")
        .json(&json!({ "category": "snack" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"]["message"], "유효하지 않은 카테고리입니다.");

    let resp = app
        .post("u1", "/api/health-logs")
        .json(&json!({ "category": "sleep", "logged_at": "yesterday" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.delete("u1", "/api/health-logs").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"]["message"], "삭제할 기록 ID가 필요합니다.");

    let resp = app
        .client
        .put(app.url("/api/health-logs?id=missing"))
        .header("x-user-id", "u1")
        .json(&json!({ "note": "edited" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .get("u1", "/api/health-logs?start_date=2025-13-01")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── Schedules, cycle, profile, push ────────────────────────────────

#[tokio::test]
async fn test_schedules_round() {
    let app = spawn_app().await;

    let resp = app
        .post("u1", "/api/schedules")
        .json(&json!({ "nope": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"]["message"], "유효하지 않은 데이터입니다.");

    let resp = app
        .post("u1", "/api/schedules")
        .json(&json!({
            "schedules": [
                { "category": "medication", "title": "혈압약", "scheduled_time": "08:00" },
                { "category": "medication", "title": "비타민", "scheduled_time": "20:00" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_of(app.get("u1", "/api/schedules").send().await.unwrap()).await;
    assert_eq!(body["total"], 2);

    let resp = app.delete("u1", "/api/schedules?id=nope").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cycle_actions() {
    let app = spawn_app().await;

    let resp = app
        .post("u1", "/api/cycle-logs")
        .json(&json!({ "action": "pause" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .post("u1", "/api/cycle-logs")
        .json(&json!({ "action": "start" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"]["message"], "시작일을 입력해주세요.");

    let resp = app
        .post("u1", "/api/cycle-logs")
        .json(&json!({ "action": "end", "end_date": "2025-03-05" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .post("u1", "/api/cycle-logs")
        .json(&json!({ "action": "start", "start_date": "2025-03-01" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["message"], "그날 시작이 기록되었습니다.");

    let resp = app
        .post("u1", "/api/cycle-logs")
        .json(&json!({ "action": "end", "end_date": "2025-03-05" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_of(app.get("u1", "/api/cycle-logs").send().await.unwrap()).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_profile_round() {
    let app = spawn_app().await;

    let body = json_of(app.get("u1", "/api/profile").send().await.unwrap()).await;
    assert!(body["profile"].is_null());

    let resp = app
        .post("u1", "/api/profile")
        .json(&json!({ "birth_date": "1999-02-30" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .post("u1", "/api/profile")
        .json(&json!({ "birth_date": "1980-01-01", "height": 170.0, "weight": 70.0, "nickname": "건강이" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_of(app.get("u1", "/api/profile").send().await.unwrap()).await;
    let age = body["profile"]["age"].as_i64().unwrap();
    assert!(age >= 44, "age derived from birth date: {}", age);
    assert_eq!(body["profile"]["nickname"], "건강이");

    let radar = json_of(app.get("u1", "/api/radar").send().await.unwrap()).await;
    assert_eq!(radar["axes"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_push_subscription() {
    let app = spawn_app().await;

    let resp = app
        .post("u1", "/api/push/subscribe")
        .json(&json!({ "endpoint": "https://push.example/abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .post("u1", "/api/push/subscribe")
        .json(&json!({
            "endpoint": "https://push.example/abc",
            "keys": { "p256dh": "key", "auth": "secret" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM push_subscriptions WHERE user_id = 'u1'")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let resp = app.delete("u1", "/api/push/subscribe").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM push_subscriptions")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ─── Ranking, fasting ───────────────────────────────────────────────

#[tokio::test]
async fn test_ranking_and_fasting_empty() {
    let app = spawn_app().await;

    let body = json_of(
        app.get("u1", "/api/ranking?date=2025-03-10")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["ranking"].as_array().unwrap().len(), 0);
    assert_eq!(body["message"], "해당 날짜에 기록이 없습니다.");

    let resp = app.get("u1", "/api/ranking?date=03/10").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_of(app.get("u1", "/api/fasting").send().await.unwrap()).await;
    assert!(body["hours"].is_null());
    assert!(body["lastMealAt"].is_null());
}

// ─── Group calendar ─────────────────────────────────────────────────

async fn join_with_chart(app: &TestApp, user: &str, chart: &str, nickname: Option<&str>) {
    let resp = app
        .post(user, "/api/profile")
        .json(&json!({ "chart_number": chart, "nickname": nickname }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

async fn log_on(app: &TestApp, user: &str, category: &str, logged_at: &str) {
    let resp = app
        .post(user, "/api/health-logs")
        .json(&json!({ "category": category, "logged_at": logged_at, "quantity": 81.5, "note": "비밀" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_group_calendar_shows_flags_only() {
    let app = spawn_app().await;
    join_with_chart(&app, "u1", "G1000001", Some("엄마")).await;
    join_with_chart(&app, "u2", "G1000002", None).await;
    join_with_chart(&app, "u3", "G9999999", Some("남")).await;
    let group =
        docent::group_calendar::create_group(&app.pool, "우리 가족", &["G1000001", "G1000002"])
            .await
            .unwrap();

    for day in ["2025-03-09", "2025-03-10", "2025-03-11"] {
        log_on(&app, "u1", "medication", &format!("{}T08:00:00", day)).await;
    }
    log_on(&app, "u2", "meal", "2025-03-10T12:30:00").await;
    log_on(&app, "u2", "sleep", "2025-03-10T07:00:00").await;
    log_on(&app, "u3", "exercise", "2025-03-10T18:00:00").await;

    let path = format!(
        "/api/group-calendar?group_id={}&start_date=2025-03-09&end_date=2025-03-11",
        group
    );
    let resp = app.get("u2", &path).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_of(resp).await;
    assert_eq!(body["success"], true);
    let days = body["days"].as_object().unwrap();
    assert_eq!(days.len(), 3);
    assert_eq!(
        body["days"]["2025-03-10"],
        json!({ "medication": true, "exercise": false, "meal": true })
    );
    assert_eq!(
        body["summary"],
        "이번 기간 그룹은 식단 1일, 복약 3일 기록했어요. 함께 꾸준히 챙기고 있어요."
    );
    let raw = body.to_string();
    assert!(!raw.contains("81.5") && !raw.contains("비밀"));

    // Outsiders and callers without a chart number are refused.
    let resp = app.get("u3", &path).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = app.get("u4", &path).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_of(resp).await["error"]["message"], "차트 번호가 없습니다.");

    let resp = app
        .get("u1", "/api/group-calendar?group_id=nope&start_date=2025-03-09&end_date=2025-03-11")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .get("u1", "/api/group-calendar?start_date=2025-03-09&end_date=2025-03-11")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = app
        .get("u1", &format!("/api/group-calendar?group_id={}&start_date=2025-03-12&end_date=2025-03-11", group))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_member_calendar_comment_and_access() {
    let app = spawn_app().await;
    join_with_chart(&app, "u1", "G1000001", Some("엄마")).await;
    join_with_chart(&app, "u2", "G1000002", None).await;
    join_with_chart(&app, "u3", "G9999999", None).await;
    docent::group_calendar::create_group(&app.pool, "우리 가족", &["G1000001", "G1000002"])
        .await
        .unwrap();
    for day in ["2025-03-09", "2025-03-10", "2025-03-11"] {
        log_on(&app, "u1", "medication", &format!("{}T08:00:00", day)).await;
    }
    log_on(&app, "u1", "exercise", "2025-03-11T19:00:00").await;

    let range = "start_date=2025-03-01&end_date=2025-03-31";
    let body = json_of(
        app.get("u2", &format!("/api/group-calendar/member?member_chart_number=G1000001&{}", range))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["isOwn"], false);
    assert_eq!(body["nickname"], "엄마");
    assert_eq!(body["days"].as_object().unwrap().len(), 3);
    assert_eq!(
        body["aiComment"],
        "엄마님께서 3일 연속 복약을 잊지 않으셨어요! 운동도 1일 기록하셨어요. \
         작은 습관이 모여 더 건강한 일상을 만들어 가고 있어요."
    );

    // Own calendar with no logs and no nickname.
    let body = json_of(
        app.get("u2", &format!("/api/group-calendar/member?member_chart_number=G1000002&{}", range))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["isOwn"], true);
    assert_eq!(body["nickname"], "나");
    assert_eq!(body["aiComment"], "아직 건강 기록이 없어요. 첫 기록을 남겨보세요!");

    let resp = app
        .get("u3", &format!("/api/group-calendar/member?member_chart_number=G1000001&{}", range))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        json_of(resp).await["error"]["message"],
        "같은 그룹에 속한 멤버만 조회할 수 있습니다."
    );

    let resp = app
        .get("u2", &format!("/api/group-calendar/member?member_chart_number=X0000000&{}", range))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .get("u2", "/api/group-calendar/member?member_chart_number=G1000001")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── DNI, drugs, papers ─────────────────────────────────────────────

#[tokio::test]
async fn test_dni_check_input() {
    let app = spawn_app().await;

    let resp = app
        .post("u1", "/api/dni/check")
        .json(&json!({ "foodNames": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .post("u1", "/api/dni/check")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Only meaningful when no key comes from the environment
    if std::env::var("USDA_API_KEY").is_ok() {
        return;
    }
    let resp = app
        .post("u1", "/api/dni/check")
        .json(&json!({ "foodNames": ["시금치"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_of(resp).await;
    assert_eq!(body["hasConflict"], false);
    assert_eq!(body["error"], "USDA API 키 미설정");
}

#[tokio::test]
async fn test_drug_and_paper_query_validation() {
    let app = spawn_app().await;

    let resp = app.get("u1", "/api/drugs/search").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.get("u1", "/api/drugs/ingredient").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.get("u1", "/api/medical-papers/search").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"]["message"], "query 파라미터 필요");

    let resp = app
        .post("u1", "/api/medical-papers/feed")
        .json(&json!({ "query": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ─── Chat ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_rejects_bad_input() {
    let app = spawn_app().await;

    let resp = app
        .post("u1", "/api/chat")
        .header("content-type", "application/json")
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"], "JSON 형식 오류");

    let resp = app
        .post("u1", "/api/chat")
        .json(&json!({ "message": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["error"], "메시지가 필요합니다");
}

#[tokio::test]
async fn test_chat_daily_limit() {
    let app = spawn_app_with("\n[chat]\ndaily_limit = 3\n").await;
    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    sqlx::query("INSERT INTO chat_usage (user_id, usage_date, count) VALUES ('u1', ?, 3)")
        .bind(&today)
        .execute(&app.pool)
        .await
        .unwrap();

    let resp = app
        .post("u1", "/api/chat")
        .json(&json!({ "message": "오늘 운동 뭐 할까요?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_of(resp).await;
    assert_eq!(body["dailyLimit"], true);
    assert_eq!(body["count"], 3);
    assert_eq!(body["error"], "일일 사용 제한(3회)을 초과했습니다.");
}
