//! Shared HTTP fetcher for the capabilities.
//!
//! Every capability is a single GET against a public JSON API. This module
//! owns the client and turns transport and status failures into the
//! [`ToolError`] variants the resilient invoker knows how to classify:
//!
//! | Failure | Variant | Retried |
//! |---------|---------|---------|
//! | request timeout | `Timeout` | yes |
//! | connect / reset | `Transient` | yes |
//! | HTTP 429 | `RateLimited` | yes |
//! | HTTP 5xx | `Transient` | yes |
//! | other HTTP 4xx | `Upstream` | no |
//! | undecodable body | `ExecutionFailed` | no |

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;
use wizard_config::ToolsConfig;
use wizard_core::error::ToolError;

const MAX_ERROR_BODY: usize = 200;

/// A thin reqwest wrapper with failure classification.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &ToolsConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    /// GET `url` with `query` and decode the JSON body into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        tool: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ToolError> {
        debug!(tool, url, "GET");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(tool, e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(ToolError::RateLimited {
                tool_name: tool.to_string(),
                retry_after_secs,
            });
        }
        if status.is_server_error() {
            return Err(ToolError::Transient {
                tool_name: tool.to_string(),
                reason: format!("upstream returned HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Upstream {
                tool_name: tool.to_string(),
                status: status.as_u16(),
                reason: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ToolError::ExecutionFailed {
                    tool_name: tool.to_string(),
                    reason: format!("unexpected response body: {e}"),
                }
            } else {
                self.transport_error(tool, e)
            }
        })
    }

    fn transport_error(&self, tool: &str, e: reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ToolError::Transient {
                tool_name: tool.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use wizard_core::retry::Retryable;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&ToolsConfig::default())
    }

    #[tokio::test]
    async fn status_classification() {
        let app = Router::new()
            .route("/limited", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
            .route(
                "/throttled",
                get(|| async {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        [(axum::http::header::RETRY_AFTER, "7")],
                    )
                }),
            )
            .route("/down", get(|| async { StatusCode::BAD_GATEWAY }))
            .route("/gone", get(|| async { (StatusCode::NOT_FOUND, "no such breed") }))
            .route("/html", get(|| async { "<html>oops</html>" }));
        let base = serve(app).await;
        let f = fetcher();

        let err = f
            .get_json::<serde_json::Value>("t", &format!("{base}/limited"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::RateLimited { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), None);

        let err = f
            .get_json::<serde_json::Value>("t", &format!("{base}/throttled"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(7)));

        let err = f
            .get_json::<serde_json::Value>("t", &format!("{base}/down"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Transient { .. }));
        assert!(err.is_retryable());

        let err = f
            .get_json::<serde_json::Value>("t", &format!("{base}/gone"), &[])
            .await
            .unwrap_err();
        match &err {
            ToolError::Upstream { status, reason, .. } => {
                assert_eq!(*status, 404);
                assert_eq!(reason, "no such breed");
            }
            other => panic!("Expected Upstream, got {other:?}"),
        }
        assert!(!err.is_retryable());

        let err = f
            .get_json::<serde_json::Value>("t", &format!("{base}/html"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let err = fetcher()
            .get_json::<serde_json::Value>("t", "http://127.0.0.1:9/nothing", &[])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }
}
