//! Current weather at coordinates via Open-Meteo (no API key needed).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use wizard_core::error::ToolError;
use wizard_core::tool::{ArgSchema, ParamType, Tool, ToolArgs};

use crate::http::HttpFetcher;

const NAME: &str = "get_weather";

pub struct WeatherTool {
    http: Arc<HttpFetcher>,
    endpoint: String,
}

impl WeatherTool {
    pub fn new(http: Arc<HttpFetcher>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    time: Option<String>,
    temperature_2m: f64,
    #[serde(default)]
    weather_code: i64,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Current weather (temperature in °C, conditions, wind in km/h) at the given coordinates"
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new()
            .required("latitude", ParamType::Number, "Latitude in decimal degrees")
            .required("longitude", ParamType::Number, "Longitude in decimal degrees")
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let latitude = args.require_f64("latitude")?;
        let longitude = args.require_f64("longitude")?;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ToolError::invalid(NAME, "latitude must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ToolError::invalid(NAME, "longitude must be between -180 and 180"));
        }

        let query = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("current", "temperature_2m,weather_code,wind_speed_10m".to_string()),
            ("timezone", "auto".to_string()),
        ];
        let forecast: ForecastResponse = self.http.get_json(NAME, &self.endpoint, &query).await?;
        let current = forecast.current;

        Ok(json!({
            "latitude": latitude,
            "longitude": longitude,
            "time": current.time,
            "temperature_c": current.temperature_2m,
            "weather_code": current.weather_code,
            "description": describe(current.weather_code),
            "wind_speed_kmh": current.wind_speed_10m,
        }))
    }
}

/// Human description of a WMO weather interpretation code.
pub fn describe(code: i64) -> String {
    let text = match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Icy fog",
        51 => "Light drizzle",
        53 => "Drizzle",
        55 => "Heavy drizzle",
        61 => "Light rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        71 => "Light snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        80 => "Rain showers",
        81 => "Heavy showers",
        95 => "Thunderstorm",
        other => return format!("Weather code {other}"),
    };
    text.to_string()
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

    #[test]
    fn wmo_codes() {
        assert_eq!(describe(0), "Clear sky");
        assert_eq!(describe(95), "Thunderstorm");
        assert_eq!(describe(99), "Weather code 99");
    }

    #[tokio::test]
    async fn fetches_current_conditions() {
        let app = Router::new().route(
            "/v1/forecast",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["current"], "temperature_2m,weather_code,wind_speed_10m");
                assert_eq!(q["timezone"], "auto");
                Json(json!({
                    "latitude": q["latitude"],
                    "current": {
                        "time": "2026-10-17T10:00",
                        "temperature_2m": 18.4,
                        "weather_code": 2,
                        "wind_speed_10m": 11.2
                    }
                }))
            }),
        );
        let base = serve(app).await;
        let tool = WeatherTool::new(
            Arc::new(HttpFetcher::new(&ToolsConfig::default())),
            format!("{base}/v1/forecast"),
        );

        let validated = tool
            .schema()
            .validate(NAME, &args(json!({"latitude": "40.71", "longitude": -74.01})))
            .unwrap();
        let result = tool.execute(&validated).await.unwrap();
        assert_eq!(result["temperature_c"], 18.4);
        assert_eq!(result["description"], "Partly cloudy");
        assert_eq!(result["wind_speed_kmh"], 11.2);
        assert_eq!(result["latitude"], 40.71);
    }

    #[tokio::test]
    async fn out_of_range_coordinates_rejected_without_request() {
        // Unroutable endpoint: reaching the network would fail differently.
        let tool = WeatherTool::new(
            Arc::new(HttpFetcher::new(&ToolsConfig::default())),
            "http://127.0.0.1:9/v1/forecast",
        );
        let validated = tool
            .schema()
            .validate(NAME, &args(json!({"latitude": 140.0, "longitude": 0})))
            .unwrap();
        let err = tool.execute(&validated).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
