//! End-to-end integration tests for the Weekend Wizard agent.
//!
//! These exercise the full pipeline: scripted model replies drive the real
//! agent loop, which dispatches through the real tool registry and HTTP
//! fetcher against a local mock of the public APIs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use wizard_agent::test_helpers::ScriptedProvider;
use wizard_agent::{AgentLoop, FailureKind, ReflectionVerdict, Termination};
use wizard_config::{Endpoints, ToolsConfig};
use wizard_core::event::{DomainEvent, EventBus};
use wizard_core::retry::{ResilientInvoker, RetryPolicy};
use wizard_tools::default_registry;

const QUESTION: &str = "What is the largest planet in our solar system?";

// ── Mock public APIs ─────────────────────────────────────────────────────

/// Serve `app` on an ephemeral local port. Panics if the port can't be bound.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn b64(s: &str) -> String {
    STANDARD.encode(s)
}

fn trivia_body() -> serde_json::Value {
    json!({"response_code": 0, "results": [{
        "type": b64("multiple"),
        "category": b64("Science & Nature"),
        "difficulty": b64("easy"),
        "question": b64(QUESTION),
        "correct_answer": b64("Jupiter"),
        "incorrect_answers": [b64("Saturn"), b64("Neptune"), b64("Earth")]
    }]})
}

fn public_apis() -> Router {
    Router::new()
        .route("/api.php", get(|| async { Json(trivia_body()) }))
        .route(
            "/v1/search",
            get(|| async {
                Json(json!({"results": [{
                    "name": "London", "country": "United Kingdom",
                    "latitude": 51.50853, "longitude": -0.12574
                }]}))
            }),
        )
        .route(
            "/v1/forecast",
            get(|| async {
                Json(json!({"current": {
                    "time": "2026-10-17T10:00",
                    "temperature_2m": 14.2,
                    "weather_code": 3,
                    "wind_speed_10m": 11.5
                }}))
            }),
        )
        .route(
            "/search.json",
            get(|| async {
                Json(json!({"docs": [{
                    "title": "The Moonstone", "author_name": ["Wilkie Collins"],
                    "first_publish_year": 1868, "key": "/works/OL15343W"
                }]}))
            }),
        )
        .route(
            "/joke/Any",
            get(|| async {
                Json(json!({"error": false, "type": "single",
                            "joke": "I told my wife she was drawing her eyebrows too high. She looked surprised."}))
            }),
        )
        .route(
            "/api/breeds/image/random",
            get(|| async {
                Json(json!({"message": "https://images.dog.ceo/breeds/corgi/1.jpg", "status": "success"}))
            }),
        )
}

// ── Wiring ───────────────────────────────────────────────────────────────

fn quick_policy() -> RetryPolicy {
    RetryPolicy::network()
        .with_base_delay(Duration::from_millis(5))
        .with_jitter(false)
        .with_attempt_timeout(Some(Duration::from_secs(5)))
}

fn wizard(base: &str, provider: Arc<ScriptedProvider>) -> (AgentLoop, Arc<EventBus>) {
    let bus = Arc::new(EventBus::default());
    let config = ToolsConfig {
        endpoints: Endpoints::rooted_at(base),
        ..ToolsConfig::default()
    };
    let tools = default_registry(
        &config,
        ResilientInvoker::new(quick_policy()).with_events(bus.clone()),
    );
    let agent = AgentLoop::new(provider, "mock", Arc::new(tools), bus.clone())
        .with_model_invoker(ResilientInvoker::new(quick_policy().with_max_attempts(2)));
    (agent, bus)
}

fn final_json(answer: &str) -> String {
    json!({"action": "final", "answer": answer}).to_string()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_trivia_question() {
    let base = serve(public_apis()).await;
    let answer = format!("Here's one for you: {QUESTION} (Jupiter!)");
    let provider = Arc::new(ScriptedProvider::new(vec![
        r#"{"action": "trivia", "args": {}}"#,
        final_json(&answer).as_str(),
        "looks good",
    ]));
    let (agent, _bus) = wizard(&base, provider.clone());

    let outcome = agent.run("Give me one trivia question").await;

    assert_eq!(outcome.termination, Termination::FinalAnswer);
    assert_eq!(outcome.reflection, ReflectionVerdict::Approved);
    assert!(outcome.answer.contains(QUESTION));
    assert_eq!(outcome.tool_calls_made, 1);
    assert!(outcome.observations[0].is_success());
    assert_eq!(provider.call_count(), 3);

    // The model saw the decoded question, not base64.
    let second = provider.request(1).unwrap();
    assert!(second.messages.last().unwrap().content.contains(QUESTION));
}

#[tokio::test]
async fn e2e_unknown_capability_is_bounded() {
    let base = serve(public_apis()).await;
    let provider = Arc::new(ScriptedProvider::repeating(
        r#"{"action": "nonexistent", "args": {}}"#,
    ));
    let (agent, bus) = wizard(&base, provider.clone());
    let mut events = bus.subscribe();

    let outcome = agent.run("Use the teleporter tool").await;

    assert!(outcome.iterations <= 8);
    assert_eq!(outcome.termination, Termination::RepeatedFailure);
    assert_eq!(
        outcome.observations[0].failure_kind(),
        Some(FailureKind::UnknownCapability)
    );
    // The identical invalid call reached the registry only once.
    assert_eq!(outcome.tool_calls_made, 1);

    let mut unknown = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(*event, DomainEvent::ToolDispatched { known: false, .. }) {
            unknown += 1;
        }
    }
    assert_eq!(unknown, 1);
}

#[tokio::test]
async fn e2e_full_weekend_plan() {
    let base = serve(public_apis()).await;
    let plan = "Saturday in London: 14.2°C and overcast. Read \"The Moonstone\" by Wilkie Collins. \
                Joke: I told my wife she was drawing her eyebrows too high. She looked surprised. \
                Dog: https://images.dog.ceo/breeds/corgi/1.jpg";
    let provider = Arc::new(ScriptedProvider::new(vec![
        r#"{"action": "city_to_coords", "args": {"city": "London"}}"#,
        r#"{"action": "get_weather", "args": {"latitude": 51.50853, "longitude": -0.12574}}"#,
        r#"```json
{"action": "book_recs", "args": {"topic": "mystery", "limit": 1}}
```"#,
        r#"{"action": "random_joke", "args": {}}"#,
        r#"{"action": "random_dog"}"#,
        final_json(plan).as_str(),
        "Looks good!",
    ]));
    let (agent, _bus) = wizard(&base, provider.clone());

    let outcome = agent
        .run("Plan a fun Saturday in London with mystery books")
        .await;

    assert_eq!(outcome.termination, Termination::FinalAnswer);
    assert_eq!(outcome.tool_calls_made, 5);
    assert!(outcome.observations.iter().all(|o| o.is_success()));
    let tools: Vec<&str> = outcome.observations.iter().map(|o| o.tool.as_str()).collect();
    assert_eq!(
        tools,
        vec!["city_to_coords", "get_weather", "book_recs", "random_joke", "random_dog"]
    );
    assert_eq!(outcome.answer, plan);
    assert_eq!(outcome.iterations, 6);
}

#[tokio::test]
async fn e2e_transient_outage_is_absorbed_by_retry() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/api.php",
        get(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                } else {
                    Json(trivia_body()).into_response()
                }
            }
        }),
    );
    let base = serve(app).await;
    let provider = Arc::new(ScriptedProvider::new(vec![
        r#"{"action": "trivia", "args": {}}"#,
        final_json(QUESTION).as_str(),
        "looks good",
    ]));
    let (agent, bus) = wizard(&base, provider);
    let mut events = bus.subscribe();

    let outcome = agent.run("trivia please").await;

    assert_eq!(outcome.termination, Termination::FinalAnswer);
    assert!(outcome.observations[0].is_success());
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let mut retries = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(*event, DomainEvent::RetryScheduled { .. }) {
            retries += 1;
        }
    }
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn e2e_persistent_outage_becomes_an_observation() {
    let app = Router::new().route(
        "/api.php",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let base = serve(app).await;
    let provider = Arc::new(ScriptedProvider::new(vec![
        r#"{"action": "trivia", "args": {}}"#,
        final_json("Sorry, the trivia service is down right now.").as_str(),
        "looks good",
    ]));
    let (agent, _bus) = wizard(&base, provider.clone());

    let outcome = agent.run("trivia please").await;

    assert_eq!(outcome.termination, Termination::FinalAnswer);
    assert_eq!(
        outcome.observations[0].failure_kind(),
        Some(FailureKind::RetriesExhausted)
    );
    let second = provider.request(1).unwrap();
    assert!(
        second
            .messages
            .last()
            .unwrap()
            .content
            .contains("retries exhausted")
    );
    assert!(outcome.answer.contains("down"));
}

#[tokio::test]
async fn e2e_missing_arguments_never_reach_the_network() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Json(json!({})) }
    });
    let base = serve(app).await;
    let provider = Arc::new(ScriptedProvider::new(vec![
        r#"{"action": "get_weather", "args": {"latitude": 40.7}}"#,
        final_json("I need both coordinates.").as_str(),
        "looks good",
    ]));
    let (agent, _bus) = wizard(&base, provider);

    let outcome = agent.run("weather please").await;

    assert_eq!(
        outcome.observations[0].failure_kind(),
        Some(FailureKind::InvalidArguments)
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
