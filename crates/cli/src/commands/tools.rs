//! `wizard tools`: list the capabilities the agent can call.

use std::path::Path;
use std::sync::Arc;

use wizard_config::AppConfig;
use wizard_core::event::EventBus;
use wizard_core::tool::ToolRegistry;

use super::agent::build_tools;

pub async fn run(config_path: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = build_tools(&config, Arc::new(EventBus::default()));

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        return Ok(());
    }

    println!("Available tools ({}):", registry.len());
    for line in listing(&registry) {
        println!("  {line}");
    }
    Ok(())
}

fn listing(registry: &ToolRegistry) -> Vec<String> {
    registry
        .tools()
        .iter()
        .map(|t| format!("{} : {}", t.signature(), t.description()))
        .collect()
}
