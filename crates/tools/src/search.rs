//! Web search through the Brave Search API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use toolwright_core::error::ToolError;
use toolwright_core::schema::{FieldKind, FieldSpec, ToolSchema};
use toolwright_core::tool::{Tool, parse_arguments};

use crate::http;

const UPSTREAM: &str = "Brave Search";

pub struct BraveSearchTool {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BraveSearchTool {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: http::trim_base(base_url),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    count: Option<f64>,
}

#[derive(Deserialize)]
struct SearchResponse {
    web: Option<WebResults>,
}

#[derive(Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Deserialize)]
struct WebResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl Tool for BraveSearchTool {
    fn name(&self) -> &str {
        "braveSearch"
    }

    fn description(&self) -> &str {
        "Search the web with Brave Search. Returns titles, URLs, and snippets."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::required("query", FieldKind::String, "The search query"),
            FieldSpec::optional(
                "count",
                FieldKind::Integer,
                "Number of results to return (1-10, default 5)",
            )
            .range(1.0, 10.0),
        ])
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: SearchArgs = parse_arguments(self.name(), arguments)?;
        let count = args.count.map(|n| n as u32).unwrap_or(5).clamp(1, 10);

        let response = self
            .client
            .get(format!("{}/web/search", self.base_url))
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", args.query.clone()), ("count", count.to_string())])
            .send()
            .await
            .map_err(|e| http::transport_error(self.name(), UPSTREAM, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(
                self.name(),
                format!("Brave Search API error! status: {}", status.as_u16()),
            ));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| http::decode_error(self.name(), UPSTREAM, e))?;
        let results = body.web.map(|w| w.results).unwrap_or_default();
        if results.is_empty() {
            return Ok(format!("No results found for \"{}\".", args.query));
        }

        let lines: Vec<String> = results
            .iter()
            .take(count as usize)
            .enumerate()
            .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.description))
            .collect();
        Ok(lines.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server::serve;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn lists_results() {
        let app = Router::new().route(
            "/web/search",
            get(
                |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(headers["x-subscription-token"], "brave-key");
                    assert_eq!(q["q"], "rust async");
                    assert_eq!(q["count"], "2");
                    Json(json!({
                        "web": {"results": [
                            {"title": "Async Book", "url": "https://rust-lang.github.io/async-book/", "description": "Asynchronous Programming in Rust"},
                            {"title": "Tokio", "url": "https://tokio.rs", "description": "An asynchronous runtime"}
                        ]}
                    }))
                },
            ),
        );
        let tool = BraveSearchTool::new(http::client(), serve(app).await, "brave-key");

        let out = tool
            .call(json!({"query": "rust async", "count": 2}))
            .await
            .unwrap();
        assert!(out.starts_with("1. Async Book\n   https://rust-lang.github.io/async-book/"));
        assert!(out.contains("2. Tokio\n   https://tokio.rs\n   An asynchronous runtime"));
    }

    #[tokio::test]
    async fn empty_results() {
        let app = Router::new().route("/web/search", get(|| async { Json(json!({})) }));
        let tool = BraveSearchTool::new(http::client(), serve(app).await, "k");
        let out = tool.call(json!({"query": "zzqx"})).await.unwrap();
        assert_eq!(out, "No results found for \"zzqx\".");
    }

    #[tokio::test]
    async fn upstream_error_fails() {
        let app = Router::new().route("/web/search", get(|| async { StatusCode::FORBIDDEN }));
        let tool = BraveSearchTool::new(http::client(), serve(app).await, "k");
        let err = tool.call(json!({"query": "x"})).await.unwrap_err();
        assert!(err.to_string().contains("status: 403"));
    }
}
