//! Assistant tool extension point.
//!
//! A [`Tool`] is a named, schema-described operation that an agent (or
//! any HTTP client) can discover through `GET /tools/list` and invoke
//! through `POST /tools/{name}`. Tools run against a [`ToolContext`],
//! which hands them the database pool, configuration and the outbound
//! API clients.
//!
//! # Built-in tools
//!
//! | Name | Purpose |
//! |------|---------|
//! | `daily_score` | Score a day from logged activity flags |
//! | `health_radar` | Five-axis radar from age, body and conditions |
//! | `search_papers` | Search stored paper chunks |
//! | `check_dni` | Drug-nutrient interaction check for foods |
//! | `search_drug` | Cache-first MFDS drug lookup |
//!
//! # Adding a tool
//!
//! ```rust
//! use async_trait::async_trait;
//! use anyhow::Result;
//! use serde_json::{json, Value};
//! use docent::traits::{Tool, ToolContext};
//!
//! pub struct PingTool;
//!
//! #[async_trait]
//! impl Tool for PingTool {
//!     fn name(&self) -> &str { "ping" }
//!     fn description(&self) -> &str { "Reply with pong" }
//!
//!     fn parameters_schema(&self) -> Value {
//!         json!({ "type": "object", "properties": {}, "required": [] })
//!     }
//!
//!     async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Value> {
//!         Ok(json!({ "pong": true }))
//!     }
//! }
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::clients::Clients;
use crate::config::Config;
use crate::dni;
use crate::drugs;
use crate::papers;
use crate::radar::{self, RadarInput};
use crate::scoring::{self, DayActivity};

// ═══════════════════════════════════════════════════════════════════════
// Tool
// ═══════════════════════════════════════════════════════════════════════

/// A named operation callable over HTTP.
///
/// The server lists a registered tool by its name, description and schema,
/// and runs [`execute`](Tool::execute) only once the request params have
/// passed [`validate_params`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`); lowercase with underscores.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether the tool ships with the crate. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema of the parameters object (`type: "object"`,
    /// `properties`, optional `required` and per-property `default`).
    fn parameters_schema(&self) -> Value;

    /// Execute with validated parameters. The value is wrapped in
    /// `{ "result": ... }` by the server.
    ///
    /// Error messages drive the HTTP status: `not found` → 404,
    /// `must not be empty` / `invalid` → 400, `not configured` → 503,
    /// `timed out` → 408, anything else → 500.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Serializable tool info for the `/tools/list` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// Checks `params` against a tool schema and injects defaults.
///
/// Enforces `required`, primitive `type`s and `enum`s. Properties that
/// are absent but declare a `default` are filled in.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("invalid params: expected an object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();
    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    prop_name,
                    expected,
                    json_type_name(value)
                );
            }
        }

        if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    prop_name,
                    names.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What a tool can reach while it runs. Built per call by the server.
pub struct ToolContext {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub clients: Arc<Clients>,
    /// Caller from the `x-user-id` header, when present.
    pub user_id: Option<String>,
}

impl ToolContext {
    pub fn require_user(&self) -> Result<&str> {
        match self.user_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => bail!("x-user-id must not be empty for this tool"),
        }
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    let value = params.get(key).and_then(|v| v.as_str()).unwrap_or("").trim();
    if value.is_empty() {
        bail!("{} must not be empty", key);
    }
    Ok(value)
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in tools
// ═══════════════════════════════════════════════════════════════════════

pub struct DailyScoreTool;

#[async_trait]
impl Tool for DailyScoreTool {
    fn name(&self) -> &str {
        "daily_score"
    }

    fn description(&self) -> &str {
        "Compute the daily wellness score from logged activity"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "meals": { "type": "integer", "description": "Meals logged", "default": 0 },
                "exercise": { "type": "boolean", "default": false },
                "medication": { "type": "boolean", "default": false },
                "sleep": { "type": "boolean", "default": false }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let meals = params["meals"].as_i64().unwrap_or(0);
        if meals < 0 {
            bail!("invalid meals: {}", meals);
        }
        let activity = DayActivity {
            meal_count: meals,
            has_exercise: params["exercise"].as_bool().unwrap_or(false),
            has_medication: params["medication"].as_bool().unwrap_or(false),
            has_sleep: params["sleep"].as_bool().unwrap_or(false),
        };
        let cap = ctx.config.scoring.daily_cap;
        Ok(json!({
            "score": scoring::daily_score(&activity, cap),
            "daily_cap": cap,
        }))
    }
}

pub struct HealthRadarTool;

#[async_trait]
impl Tool for HealthRadarTool {
    fn name(&self) -> &str {
        "health_radar"
    }

    fn description(&self) -> &str {
        "Five-axis health radar from age, height, weight and conditions"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "age": { "type": "integer" },
                "height": { "type": "number", "description": "Height in cm" },
                "weight": { "type": "number", "description": "Weight in kg" },
                "conditions": { "type": "string", "description": "Free-text conditions" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
        let age = match params.get("age").and_then(|v| v.as_i64()) {
            Some(a) if !(0..=150).contains(&a) => bail!("invalid age: {}", a),
            other => other.map(|a| a as u32),
        };
        let input = RadarInput {
            age,
            height_cm: params.get("height").and_then(|v| v.as_f64()),
            weight_kg: params.get("weight").and_then(|v| v.as_f64()),
            conditions: params.get("conditions").and_then(|v| v.as_str()),
        };
        Ok(serde_json::to_value(radar::report(&input))?)
    }
}

pub struct SearchPapersTool;

#[async_trait]
impl Tool for SearchPapersTool {
    fn name(&self) -> &str {
        "search_papers"
    }

    fn description(&self) -> &str {
        "Search stored medical paper chunks"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "limit": { "type": "integer", "description": "Max chunks", "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = str_param(&params, "query")?;
        let limit = params["limit"].as_u64().unwrap_or(5).clamp(1, 50) as usize;
        let chunks = papers::search_papers(
            &ctx.pool,
            ctx.clients.embedder.as_ref(),
            query,
            ctx.config.papers.match_threshold,
            limit,
        )
        .await?;
        Ok(json!({
            "results": chunks,
            "context": papers::format_paper_context(&chunks),
        }))
    }
}

pub struct CheckDniTool;

#[async_trait]
impl Tool for CheckDniTool {
    fn name(&self) -> &str {
        "check_dni"
    }

    fn description(&self) -> &str {
        "Check foods against the caller's active medications for nutrient interactions"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "foods": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Food names, at most 5 are checked"
                }
            },
            "required": ["foods"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let user_id = ctx.require_user()?;
        let foods: Vec<&str> = params["foods"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .take(dni::MAX_FOODS)
                    .collect()
            })
            .unwrap_or_default();
        if foods.is_empty() {
            bail!("foods must not be empty");
        }
        let Some(usda) = ctx.clients.usda.as_ref() else {
            bail!("USDA API key is not configured");
        };

        let mut items = Vec::new();
        for food in foods {
            items.extend(usda.search_and_get_nutrients(food, 1).await?);
        }
        let result = dni::infer(&ctx.pool, user_id, &items).await?;
        Ok(serde_json::to_value(result)?)
    }
}

pub struct SearchDrugTool;

#[async_trait]
impl Tool for SearchDrugTool {
    fn name(&self) -> &str {
        "search_drug"
    }

    fn description(&self) -> &str {
        "Look up drug ingredients, efficacy and precautions (MFDS, cache first)"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Product or ingredient name" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = str_param(&params, "query")?;
        let result = drugs::run_drug_rag(&ctx.pool, ctx.clients.mfds.as_ref(), query).await;
        if let Err(e) = drugs::save_drug_rag_results(&ctx.pool, &result, None).await {
            tracing::warn!(error = %e, "saving drug lookup results failed");
        }
        Ok(serde_json::to_value(result)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ToolRegistry
// ═══════════════════════════════════════════════════════════════════════

/// Ordered set of tools served by the HTTP API.
///
/// ```rust
/// use docent::traits::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("daily_score").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DailyScoreTool));
        registry.register(Box::new(HealthRadarTool));
        registry.register(Box::new(SearchPapersTool));
        registry.register(Box::new(CheckDniTool));
        registry.register(Box::new(SearchDrugTool));
        registry
    }

    /// Registers a tool; a later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| ToolInfo::of(t.as_ref())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec!["daily_score", "health_radar", "search_papers", "check_dni", "search_drug"]
        );
        assert!(registry.infos().iter().all(|i| i.builtin));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::with_builtins();
        registry.register(Box::new(DailyScoreTool));
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.tools().last().unwrap().name(), "daily_score");
    }

    #[test]
    fn test_validate_injects_defaults() {
        let schema = DailyScoreTool.parameters_schema();
        let params = validate_params(&schema, &json!({"meals": 2})).unwrap();
        assert_eq!(params["meals"], 2);
        assert_eq!(params["exercise"], false);
        assert_eq!(params["sleep"], false);
    }

    #[test]
    fn test_validate_null_params_as_empty_object() {
        let schema = DailyScoreTool.parameters_schema();
        let params = validate_params(&schema, &Value::Null).unwrap();
        assert_eq!(params["meals"], 0);
    }

    #[test]
    fn test_validate_rejects_missing_and_mistyped() {
        let schema = SearchPapersTool.parameters_schema();
        let err = validate_params(&schema, &json!({})).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: query"));

        let err = validate_params(&schema, &json!({"query": 3})).unwrap_err();
        assert!(err.to_string().contains("must be of type 'string', got number"));

        let err = validate_params(&schema, &json!([1])).unwrap_err();
        assert!(err.to_string().contains("invalid params"));
    }

    #[test]
    fn test_validate_enum() {
        let schema = json!({
            "type": "object",
            "properties": { "mode": { "type": "string", "enum": ["a", "b"] } }
        });
        assert!(validate_params(&schema, &json!({"mode": "a"})).is_ok());
        let err = validate_params(&schema, &json!({"mode": "c"})).unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn test_str_param_trims() {
        assert_eq!(str_param(&json!({"query": "  knee "}), "query").unwrap(), "knee");
        let err = str_param(&json!({"query": "  "}), "query").unwrap_err();
        assert_eq!(err.to_string(), "query must not be empty");
    }
}
