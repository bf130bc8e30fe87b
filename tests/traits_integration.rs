//! Integration tests for the assistant tool registry.
//!
//! These prove that built-in tools and custom `Tool` implementations are
//! listed and dispatched end-to-end through the HTTP server.

use anyhow::{bail, Result};
use async_trait::async_trait;
use docent::config::Config;
use docent::server::{router, run_server, AppState};
use docent::traits::{Tool, ToolContext, ToolRegistry};
use docent::{db, migrate};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

// ─── Test Tool ──────────────────────────────────────────────────────

/// Counts the caller's health logs.
struct LogCountTool;

#[async_trait]
impl Tool for LogCountTool {
    fn name(&self) -> &str {
        "count_logs"
    }

    fn description(&self) -> &str {
        "Count the caller's health logs"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "enum": ["meal", "exercise", "medication", "sleep"]
                }
            },
            "required": ["category"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let user_id = ctx.require_user()?;
        let Some(category) = params["category"].as_str() else {
            bail!("invalid category");
        };
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM health_logs WHERE user_id = ? AND category = ?",
        )
        .bind(user_id)
        .bind(category)
        .fetch_one(&ctx.pool)
        .await?;
        Ok(json!({ "category": category, "count": count }))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config_with_port(tmp: &TempDir, port: u16) -> Config {
    let content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:{}"
"#,
        tmp.path().join("docent.sqlite").display(),
        port
    );
    toml::from_str(&content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Serves the router with builtins plus [`LogCountTool`] on a free port.
async fn spawn_with_custom_tool(tmp: &TempDir) -> u16 {
    let port = find_free_port();
    let cfg = test_config_with_port(tmp, port);
    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    sqlx::query(
        "INSERT INTO health_logs (id, user_id, category, logged_at, created_at) \
         VALUES ('l1', 'u1', 'meal', '2025-03-10T08:00:00', '2025-03-10T08:00:00'), \
                ('l2', 'u1', 'meal', '2025-03-10T12:00:00', '2025-03-10T12:00:00'), \
                ('l3', 'u2', 'meal', '2025-03-10T12:00:00', '2025-03-10T12:00:00')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut state = AppState::new(cfg, pool).unwrap();
    let mut tools = ToolRegistry::with_builtins();
    tools.register(Box::new(LogCountTool));
    state.tools = Arc::new(tools);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    wait_for_server(port).await;
    port
}

// ─── Tests ──────────────────────────────────────────────────────────

/// The stock server binds from config, migrates its own database and
/// answers health checks.
#[tokio::test]
async fn test_run_server_health() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let cfg = test_config_with_port(&tmp, port);

    tokio::spawn(async move {
        run_server(&cfg).await.unwrap();
    });
    wait_for_server(port).await;

    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_custom_tool_listed_and_called() {
    let tmp = TempDir::new().unwrap();
    let port = spawn_with_custom_tool(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://127.0.0.1:{}/tools/list", port))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let tools = body["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec!["daily_score", "health_radar", "search_papers", "check_dni", "search_drug", "count_logs"]
    );
    let custom = tools.iter().find(|t| t["name"] == "count_logs").unwrap();
    assert_eq!(custom["builtin"], false);

    let resp = client
        .post(format!("http://127.0.0.1:{}/tools/count_logs", port))
        .header("x-user-id", "u1")
        .json(&json!({ "params": { "category": "meal" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["count"], 2);
}

#[tokio::test]
async fn test_tool_parameter_validation() {
    let tmp = TempDir::new().unwrap();
    let port = spawn_with_custom_tool(&tmp).await;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/tools/count_logs", port);

    // Missing required parameter
    let resp = client
        .post(&url)
        .header("x-user-id", "u1")
        .json(&json!({ "params": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    // Value outside the enum
    let resp = client
        .post(&url)
        .header("x-user-id", "u1")
        .json(&json!({ "params": { "category": "snack" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // No caller
    let resp = client
        .post(&url)
        .json(&json!({ "params": { "category": "meal" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("count_logs: x-user-id must not be empty"));
}

#[tokio::test]
async fn test_builtin_tools_over_http() {
    let tmp = TempDir::new().unwrap();
    let port = spawn_with_custom_tool(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{}/tools/daily_score", port))
        .json(&json!({ "params": { "meals": 5, "exercise": true } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["score"], 6);
    assert_eq!(body["result"]["daily_cap"], 10);

    let resp = client
        .post(format!("http://127.0.0.1:{}/tools/health_radar", port))
        .json(&json!({ "params": { "age": 45, "height": 170.0, "weight": 70.0 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["axes"].as_array().unwrap().len(), 5);

    let resp = client
        .post(format!("http://127.0.0.1:{}/tools/no_such_tool", port))
        .json(&json!({ "params": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
