//! Weekend Wizard CLI: the main entry point.
//!
//! Commands:
//! - `agent`   One prompt (`-m`) or an interactive session
//! - `tools`   List the capabilities the agent can call
//! - `doctor`  Check configuration and model reachability
//! - `config`  Show, locate, or initialize the config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "wizard",
    about = "Weekend Wizard: plans your weekend with weather, books, jokes, dogs and trivia",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.wizard/config.toml)
    #[arg(short, long, global = true, env = "WIZARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the wizard
    Agent {
        /// Send a single prompt instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List available tools
    Tools {
        /// Print the JSON argument schemas instead
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and model reachability
    Doctor,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only answers.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Agent { message } => commands::agent::run(config, message).await?,
        Commands::Tools { json } => commands::tools::run(config, json).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config).await?,
            ConfigAction::Path => commands::config_cmd::path(config).await?,
            ConfigAction::Init { force } => commands::config_cmd::init(config, force).await?,
        },
    }

    Ok(())
}
