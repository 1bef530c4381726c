//! A random dog photo URL via Dog CEO.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use wizard_core::error::ToolError;
use wizard_core::tool::{ArgSchema, Tool, ToolArgs};

use crate::http::HttpFetcher;

const NAME: &str = "random_dog";

pub struct RandomDogTool {
    http: Arc<HttpFetcher>,
    endpoint: String,
}

impl RandomDogTool {
    pub fn new(http: Arc<HttpFetcher>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DogResponse {
    message: String,
    status: String,
}

#[async_trait]
impl Tool for RandomDogTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "URL of a random dog picture"
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new()
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value, ToolError> {
        let response: DogResponse = self.http.get_json(NAME, &self.endpoint, &[]).await?;
        if response.status != "success" {
            return Err(ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason: format!("Dog CEO answered '{}': {}", response.status, response.message),
            });
        }
        Ok(json!({ "image_url": response.message }))
    }
}
