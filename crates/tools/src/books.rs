//! Book suggestions for a topic via Open Library search.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use wizard_core::error::ToolError;
use wizard_core::tool::{ArgSchema, ParamType, Tool, ToolArgs};

use crate::http::HttpFetcher;

const NAME: &str = "book_recs";
const DEFAULT_LIMIT: i64 = 5;
const MAX_LIMIT: i64 = 20;

pub struct BookRecsTool {
    http: Arc<HttpFetcher>,
    /// Site root; search is `/search.json`, links are `root + key`
    root: String,
}

impl BookRecsTool {
    pub fn new(http: Arc<HttpFetcher>, root: impl Into<String>) -> Self {
        Self {
            http,
            root: root.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<Doc>,
}

#[derive(Debug, Deserialize)]
struct Doc {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    first_publish_year: Option<i64>,
    #[serde(default)]
    key: String,
}

#[async_trait]
impl Tool for BookRecsTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Book suggestions on a topic: title, author, first publish year, Open Library link"
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new()
            .required("topic", ParamType::String, "Subject or keywords, e.g. \"mystery\"")
            .optional(
                "limit",
                ParamType::Integer,
                "How many books to return (1-20)",
                Some(json!(DEFAULT_LIMIT)),
            )
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let topic = args.require_str("topic")?.trim();
        if topic.is_empty() {
            return Err(ToolError::invalid(NAME, "topic must not be empty"));
        }
        let limit = args.i64_or("limit", DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ToolError::invalid(
                NAME,
                format!("limit must be between 1 and {MAX_LIMIT}"),
            ));
        }

        let url = format!("{}/search.json", self.root);
        let query = [("q", topic.to_string()), ("limit", limit.to_string())];
        let response: SearchResponse = self.http.get_json(NAME, &url, &query).await?;

        let picks: Vec<Value> = response
            .docs
            .into_iter()
            .take(limit as usize)
            .map(|d| {
                json!({
                    "title": d.title,
                    "author": d.author_name.into_iter().next().unwrap_or_else(|| "Unknown".into()),
                    "year": d.first_publish_year,
                    "link": format!("{}{}", self.root, d.key),
                })
            })
            .collect();

        Ok(json!({ "topic": topic, "results": picks }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{args, serve};
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use wizard_config::ToolsConfig;

    #[tokio::test]
    async fn maps_search_results() {
        let app = Router::new().route(
            "/search.json",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["q"], "mystery");
                assert_eq!(q["limit"], "2");
                Json(json!({"numFound": 2, "docs": [
                    {"title": "The Hound of the Baskervilles", "author_name": ["Arthur Conan Doyle"],
                     "first_publish_year": 1902, "key": "/works/OL262421W"},
                    {"title": "Anonymous Mystery", "key": "/works/OL1W"}
                ]}))
            }),
        );
        let base = serve(app).await;
        let tool = BookRecsTool::new(Arc::new(HttpFetcher::new(&ToolsConfig::default())), &base);

        let validated = tool
            .schema()
            .validate(NAME, &args(json!({"topic": "mystery", "limit": 2})))
            .unwrap();
        let result = tool.execute(&validated).await.unwrap();
        let books = result["results"].as_array().unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0]["author"], "Arthur Conan Doyle");
        assert_eq!(books[0]["year"], 1902);
        assert_eq!(books[0]["link"], format!("{base}/works/OL262421W"));
        assert_eq!(books[1]["author"], "Unknown");
        assert!(books[1]["year"].is_null());
    }

    #[tokio::test]
    async fn limit_out_of_range_is_invalid() {
        let tool = BookRecsTool::new(
            Arc::new(HttpFetcher::new(&ToolsConfig::default())),
            "http://127.0.0.1:9",
        );
        let validated = tool
            .schema()
            .validate(NAME, &args(json!({"topic": "poetry", "limit": 0})))
            .unwrap();
        let err = tool.execute(&validated).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn limit_defaults_to_five() {
        let tool = BookRecsTool::new(
            Arc::new(HttpFetcher::new(&ToolsConfig::default())),
            "http://127.0.0.1:9",
        );
        let validated = tool
            .schema()
            .validate(NAME, &args(json!({"topic": "poetry"})))
            .unwrap();
        assert_eq!(validated.i64_or("limit", 0), 5);
    }
}
