//! City name → coordinates via Open-Meteo geocoding.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use wizard_core::error::ToolError;
use wizard_core::tool::{ArgSchema, ParamType, Tool, ToolArgs};

use crate::http::HttpFetcher;

const NAME: &str = "city_to_coords";

pub struct CityToCoordsTool {
    http: Arc<HttpFetcher>,
    endpoint: String,
}

impl CityToCoordsTool {
    pub fn new(http: Arc<HttpFetcher>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    // Absent entirely when nothing matched.
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    #[serde(default)]
    country: Option<String>,
    latitude: f64,
    longitude: f64,
}

#[async_trait]
impl Tool for CityToCoordsTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Resolve a city name to latitude/longitude (use before get_weather)"
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new().required("city", ParamType::String, "City name, e.g. \"Lisbon\"")
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let city = args.require_str("city")?.trim();
        if city.is_empty() {
            return Err(ToolError::invalid(NAME, "city must not be empty"));
        }

        let query = [
            ("name", city.to_string()),
            ("count", "1".to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];
        let response: SearchResponse = self.http.get_json(NAME, &self.endpoint, &query).await?;

        let place = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason: format!("City '{city}' not found. Try a more specific name."),
            })?;

        Ok(json!({
            "city": place.name,
            "country": place.country,
            "latitude": place.latitude,
            "longitude": place.longitude,
        }))
    }
}
