//! `wizard agent`: single-prompt or interactive mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use wizard_agent::{AgentLoop, AgentOutcome};
use wizard_config::AppConfig;
use wizard_core::event::{DomainEvent, EventBus};
use wizard_core::provider::Provider;
use wizard_core::retry::ResilientInvoker;
use wizard_core::tool::ToolRegistry;

const EXAMPLES: &[&str] = &[
    "Plan a cozy Saturday in NYC at (40.7128, -74.0060) with mystery books",
    "What is the weather at (37.7749, -122.4194)?",
    "Give me a trivia question",
    "Plan a fun Sunday in London (use the city name)",
];

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let provider = wizard_providers::build_from_config(&config);
    ensure_reachable(provider.as_ref(), &config).await?;

    let event_bus = Arc::new(EventBus::default());
    let tools = Arc::new(build_tools(&config, event_bus.clone()));
    let agent = AgentLoop::from_config(&config, provider, tools, event_bus.clone());

    if let Some(msg) = message {
        let outcome = answer(&agent, &event_bus, &msg).await;
        println!("{}", outcome.answer);
        return Ok(());
    }

    println!("{}", "=".repeat(50));
    println!("       Weekend Wizard");
    println!("{}", "=".repeat(50));
    println!("  Model : {} (via {})", config.model, config.provider);
    println!("  Tools : {}", agent.tools().names().join(", "));
    println!("{}", "=".repeat(50));
    println!();
    println!("Example prompts:");
    for example in EXAMPLES {
        println!("  {example}");
    }
    println!();
    println!("Type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        // Ctrl-C at the prompt quits; during a request it only cancels that request.
        let line = match next_input(&mut lines, tokio::signal::ctrl_c()).await? {
            Input::Line(line) => line,
            Input::Eof | Input::Interrupted => {
                println!();
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit(input) {
            break;
        }

        // Fresh conversation per prompt.
        let outcome = answer(&agent, &event_bus, input).await;
        println!();
        println!("Wizard:\n{}", outcome.answer);
        println!();
        println!("{}", "-".repeat(50));
        println!();
    }

    println!("Have a great weekend!");
    Ok(())
}

/// The registry every command shares, dispatching under the tool retry policy.
pub fn build_tools(config: &AppConfig, event_bus: Arc<EventBus>) -> ToolRegistry {
    let invoker = ResilientInvoker::new(config.tool_retry.to_policy()).with_events(event_bus);
    wizard_tools::default_registry(&config.tools, invoker)
}

/// Fail startup with setup hints when the model endpoint can't be reached.
pub async fn ensure_reachable(
    provider: &dyn Provider,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let reason = match provider.health_check().await {
        Ok(true) => return Ok(()),
        Ok(false) => "endpoint did not answer".to_string(),
        Err(e) => e.to_string(),
    };

    eprintln!();
    eprintln!("[ERROR] Cannot reach the {} model endpoint: {reason}", config.provider);
    for hint in setup_hints(config) {
        eprintln!("  {hint}");
    }
    eprintln!();
    Err(format!("model endpoint unreachable ({reason})").into())
}

pub fn setup_hints(config: &AppConfig) -> Vec<String> {
    if config.provider == "ollama" {
        vec![
            "1. Install Ollama from: https://ollama.com".into(),
            "2. Start it:  ollama serve".into(),
            format!("3. Pull the model:  ollama pull {}", config.model),
            "Then re-run this command.".into(),
        ]
    } else {
        vec![
            format!(
                "Check api_url and api_key in {}",
                AppConfig::config_path().display()
            ),
            "or set WIZARD_API_URL / WIZARD_API_KEY.".into(),
        ]
    }
}

#[derive(Debug, PartialEq)]
enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// The next prompt line, or whichever of EOF and `interrupt` comes first.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Input>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?.map_or(Input::Eof, Input::Line)),
        _ = interrupt => Ok(Input::Interrupted),
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit" | "bye")
}

/// Run one request with a progress line on stderr. Ctrl-C cancels the
/// request, not the process.
async fn answer(agent: &AgentLoop, event_bus: &EventBus, request: &str) -> AgentOutcome {
    let cancel = CancellationToken::new();
    let progress = tokio::spawn(draw_progress(event_bus.subscribe()));
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = agent.run_until(request, &cancel).await;

    interrupt.abort();
    let _ = progress.await;
    outcome
}

/// `[Wizard is thinking..?.]`: one `.` per dispatch, `?` per unknown tool.
async fn draw_progress(mut events: broadcast::Receiver<Arc<DomainEvent>>) {
    eprint!("[Wizard is thinking");
    loop {
        match events.recv().await {
            Ok(event) => match progress_mark(&event) {
                Some(mark) => eprint!("{mark}"),
                None if matches!(*event, DomainEvent::InvocationFinished { .. }) => break,
                None => {}
            },
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    eprintln!("]");
}

fn progress_mark(event: &DomainEvent) -> Option<char> {
    match event {
        DomainEvent::ToolDispatched { known: true, .. } => Some('.'),
        DomainEvent::ToolDispatched { known: false, .. } => Some('?'),
        _ => None,
    }
}
