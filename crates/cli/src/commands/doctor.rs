//! `wizard doctor`: check configuration and model reachability.

use std::path::Path;

use wizard_config::AppConfig;
use wizard_providers::default_base_url;

use super::agent::setup_hints;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Weekend Wizard Doctor");
    println!("========================");
    println!();

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path);
    if path.exists() {
        println!("📁 Config: {}", path.display());
    } else {
        println!("📁 Config: {} (not found, using defaults)", path.display());
    }

    let config = match AppConfig::load(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed and validated");
            config
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };

    let api_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));
    println!();
    println!("   Provider:  {}", config.provider);
    println!("   Model:     {}", config.model);
    println!("   Endpoint:  {api_url}");
    println!("   Max steps: {}", config.agent.max_steps);
    println!(
        "   Reflection: {}",
        if config.agent.reflection { "on" } else { "off" }
    );
    if config.provider != "ollama" && config.api_key.is_none() {
        println!("   ⚠️  No API key set (WIZARD_API_KEY, OPENAI_API_KEY or OPENROUTER_API_KEY)");
    }

    println!();
    println!("🔌 Model endpoint");
    let provider = wizard_providers::build_from_config(&config);
    match provider.list_models().await {
        Ok(models) => {
            println!("   ✅ Reachable ({} models)", models.len());
            if !models.is_empty() && !has_model(&models, &config.model) {
                println!("   ⚠️  Model '{}' not listed by the endpoint", config.model);
            }
        }
        Err(e) => {
            println!("   ❌ Unreachable: {e}");
            for hint in setup_hints(&config) {
                println!("      {hint}");
            }
            return Err(format!("model endpoint unreachable ({e})").into());
        }
    }

    println!();
    println!("All checks passed.");
    Ok(())
}

/// Ollama lists `mistral:latest` for a configured `mistral`.
fn has_model(models: &[String], wanted: &str) -> bool {
    models
        .iter()
        .any(|m| m == wanted || m.strip_suffix(":latest") == Some(wanted))
}
