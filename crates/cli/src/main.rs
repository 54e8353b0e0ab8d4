//! Orquesta CLI, the main entry point.
//!
//! Commands:
//! - `chat`: Interactive or single-message chat as a tenant
//! - `decide`: Show the tool-need decision for a message (no LLM call)
//! - `tools`: List the tool catalog and what a tenant may use
//! - `config`: Validate, show or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

use commands::TenantArgs;

#[derive(Parser)]
#[command(
    name = "orquesta",
    about = "Orquesta: chatbot agent orchestration engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "ORQUESTA_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a tenant's chatbot
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print streaming events as they arrive
        #[arg(long)]
        stream: bool,

        /// Print the full reply as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        tenant: TenantArgs,
    },

    /// Show the tool-need decision for a message
    Decide {
        message: String,

        #[command(flatten)]
        tenant: TenantArgs,
    },

    /// List tools and their gating for a tenant
    Tools {
        #[command(flatten)]
        tenant: TenantArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the configuration file
    Validate,
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file if none exists
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Chat {
            message,
            stream,
            json,
            tenant,
        } => commands::chat::run(message, stream, json, tenant).await?,
        Commands::Decide { message, tenant } => commands::decide::run(&message, &tenant).await?,
        Commands::Tools { tenant } => commands::tools::run(&tenant).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
