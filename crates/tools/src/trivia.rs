//! One multiple-choice trivia question via Open Trivia DB.
//!
//! Fields are requested base64-encoded and decoded here, which sidesteps
//! the HTML entities the API otherwise embeds (`&quot;`, `&#039;`, ...).

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use wizard_core::error::ToolError;
use wizard_core::tool::{ArgSchema, Tool, ToolArgs};

use crate::http::HttpFetcher;

const NAME: &str = "trivia";

/// `response_code` the API uses for "too many requests" (one per 5s per IP).
const RATE_LIMITED: u8 = 5;
const RATE_LIMIT_WAIT_SECS: u64 = 5;

pub struct TriviaTool {
    http: Arc<HttpFetcher>,
    endpoint: String,
}

impl TriviaTool {
    pub fn new(http: Arc<HttpFetcher>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TriviaResponse {
    response_code: u8,
    #[serde(default)]
    results: Vec<Question>,
}

#[derive(Debug, Deserialize)]
struct Question {
    category: String,
    difficulty: String,
    question: String,
    correct_answer: String,
    incorrect_answers: Vec<String>,
}

fn decode(field: &str) -> Result<String, ToolError> {
    let bytes = STANDARD.decode(field).map_err(|e| ToolError::ExecutionFailed {
        tool_name: NAME.into(),
        reason: format!("bad base64 field: {e}"),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl Tool for TriviaTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "One multiple-choice trivia question with its correct and incorrect answers"
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new()
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value, ToolError> {
        let query = [
            ("amount", "1".to_string()),
            ("type", "multiple".to_string()),
            ("encode", "base64".to_string()),
        ];
        let response: TriviaResponse = self.http.get_json(NAME, &self.endpoint, &query).await?;

        match response.response_code {
            0 => {}
            RATE_LIMITED => {
                return Err(ToolError::RateLimited {
                    tool_name: NAME.into(),
                    retry_after_secs: Some(RATE_LIMIT_WAIT_SECS),
                });
            }
            code => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: NAME.into(),
                    reason: format!("Open Trivia DB response code {code}"),
                });
            }
        }

        let q = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason: "No trivia available right now, try again later.".into(),
            })?;

        let incorrect = q
            .incorrect_answers
            .iter()
            .map(|a| decode(a))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(json!({
            "category": decode(&q.category)?,
            "difficulty": decode(&q.difficulty)?,
            "question": decode(&q.question)?,
            "correct_answer": decode(&q.correct_answer)?,
            "incorrect_answers": incorrect,
        }))
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

    fn b64(s: &str) -> String {
        STANDARD.encode(s)
    }

    #[tokio::test]
    async fn decodes_question() {
        let app = Router::new().route(
            "/api.php",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["encode"], "base64");
                Json(json!({"response_code": 0, "results": [{
                    "type": b64("multiple"),
                    "category": b64("Science: Computers"),
                    "difficulty": b64("easy"),
                    "question": b64("What does \"CPU\" stand for?"),
                    "correct_answer": b64("Central Processing Unit"),
                    "incorrect_answers": [b64("Computer Personal Unit"), b64("Central Process Unit"), b64("Central Processor Unifier")]
                }]}))
            }),
        );
        let base = serve(app).await;
        let tool = TriviaTool::new(
            Arc::new(HttpFetcher::new(&ToolsConfig::default())),
            format!("{base}/api.php"),
        );
        let validated = tool.schema().validate(NAME, &args(json!({}))).unwrap();
        let result = tool.execute(&validated).await.unwrap();
        assert_eq!(result["question"], "What does \"CPU\" stand for?");
        assert_eq!(result["correct_answer"], "Central Processing Unit");
        assert_eq!(result["incorrect_answers"].as_array().unwrap().len(), 3);
        assert_eq!(result["category"], "Science: Computers");
    }

    #[tokio::test]
    async fn in_band_rate_limit_is_retryable() {
        use wizard_core::retry::Retryable;

        let app = Router::new().route(
            "/api.php",
            get(|| async { Json(json!({"response_code": 5, "results": []})) }),
        );
        let base = serve(app).await;
        let tool = TriviaTool::new(
            Arc::new(HttpFetcher::new(&ToolsConfig::default())),
            format!("{base}/api.php"),
        );
        let validated = tool.schema().validate(NAME, &args(json!({}))).unwrap();
        let err = tool.execute(&validated).await.unwrap_err();
        assert!(matches!(err, ToolError::RateLimited { .. }));
        assert!(err.is_retryable());
        // The API allows one request per 5 seconds per IP.
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(5)));
    }
}
