//! Built-in capabilities for Weekend Wizard.
//!
//! Each capability is a stateless adapter to one public, key-free JSON API:
//! weather, geocoding, books, jokes, dog pictures, trivia. They share one
//! [`http::HttpFetcher`] whose failure classification drives the registry's
//! retry policy.

pub mod books;
pub mod dog;
pub mod geocode;
pub mod http;
pub mod joke;
pub mod trivia;
pub mod weather;

use std::sync::Arc;

use wizard_config::ToolsConfig;
use wizard_core::retry::ResilientInvoker;
use wizard_core::tool::ToolRegistry;

pub use http::HttpFetcher;

/// Create the registry with every built-in capability, dispatching through
/// `invoker`.
pub fn default_registry(config: &ToolsConfig, invoker: ResilientInvoker) -> ToolRegistry {
    let http = Arc::new(HttpFetcher::new(config));
    let endpoints = &config.endpoints;

    let mut registry = ToolRegistry::with_invoker(invoker);
    registry.register(Box::new(weather::WeatherTool::new(
        http.clone(),
        &endpoints.open_meteo,
    )));
    registry.register(Box::new(geocode::CityToCoordsTool::new(
        http.clone(),
        &endpoints.geocoding,
    )));
    registry.register(Box::new(books::BookRecsTool::new(
        http.clone(),
        &endpoints.open_library,
    )));
    registry.register(Box::new(joke::RandomJokeTool::new(
        http.clone(),
        &endpoints.joke_api,
    )));
    registry.register(Box::new(dog::RandomDogTool::new(
        http.clone(),
        &endpoints.dog_ceo,
    )));
    registry.register(Box::new(trivia::TriviaTool::new(http, &endpoints.open_trivia)));
    registry
}
