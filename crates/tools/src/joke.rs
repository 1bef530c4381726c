//! A safe, family-friendly single-line joke via JokeAPI.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use wizard_core::error::ToolError;
use wizard_core::tool::{ArgSchema, Tool, ToolArgs};

use crate::http::HttpFetcher;

const NAME: &str = "random_joke";
const FALLBACK_JOKE: &str = "Why do programmers prefer dark mode? Because light attracts bugs!";

pub struct RandomJokeTool {
    http: Arc<HttpFetcher>,
    endpoint: String,
}

impl RandomJokeTool {
    pub fn new(http: Arc<HttpFetcher>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JokeResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    joke: Option<String>,
}

#[async_trait]
impl Tool for RandomJokeTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "A random safe-mode one-liner joke"
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new()
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value, ToolError> {
        let query = [("type", "single".to_string()), ("safe-mode", String::new())];
        let response: JokeResponse = self.http.get_json(NAME, &self.endpoint, &query).await?;

        let joke = match response.joke {
            Some(joke) if !response.error && !joke.trim().is_empty() => joke,
            _ => FALLBACK_JOKE.to_string(),
        };
        Ok(json!({ "joke": joke }))
    }
}
