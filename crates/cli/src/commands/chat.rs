//! `orquesta chat`: Interactive or single-message chat as a tenant.

use super::TenantArgs;
use orquesta_agent::{AgentEvent, Orchestrator};
use orquesta_config::AppConfig;
use orquesta_tools::ToolBackends;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

fn build(config: &AppConfig, tenant: &TenantArgs) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let provider = orquesta_providers::build_from_config(config)?;
    let registry = Arc::new(orquesta_tools::catalog(
        &ToolBackends::in_memory(),
        &config.tools,
    )?);
    Ok(Orchestrator::from_config(config, provider, registry)?
        .with_directory(Arc::new(tenant.directory())))
}

async fn reply(
    orchestrator: &Orchestrator,
    tenant: &TenantArgs,
    message: &str,
    stream: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = orchestrator
        .prepare_context(&tenant.tenant, &tenant.chatbot, message)
        .await;

    if stream {
        let mut rx = orchestrator.handle_stream(message.to_string(), ctx);
        while let Some(event) = rx.recv().await {
            if json {
                println!("{}", serde_json::to_string(&event)?);
                continue;
            }
            match event {
                AgentEvent::Thinking { iteration } => eprintln!("  … pensando ({iteration})"),
                AgentEvent::ToolStart { tool } => eprintln!("  ⚙ {tool}"),
                AgentEvent::Chunk { content } => {
                    print!("{content}");
                    std::io::stdout().flush()?;
                }
                AgentEvent::Done { metadata } => {
                    println!();
                    if !metadata.tools_used.is_empty() {
                        eprintln!("  tools: {}", metadata.tools_used.join(", "));
                    }
                }
                AgentEvent::Error { content, .. } => println!("{content}"),
            }
        }
        return Ok(());
    }

    match orchestrator.handle(message, &ctx).await {
        Ok(reply) if json => println!("{}", serde_json::to_string_pretty(&reply)?),
        Ok(reply) => {
            println!("{}", reply.content);
            if !reply.tools_used.is_empty() {
                eprintln!(
                    "  tools: {} ({} iteraciones)",
                    reply.tools_used.join(", "),
                    reply.iterations
                );
            }
        }
        Err(e) => {
            tracing::warn!("Chat request failed: {e}");
            println!("{}", e.user_message());
        }
    }
    Ok(())
}

pub async fn run(
    message: Option<String>,
    stream: bool,
    json: bool,
    tenant: TenantArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of ORQUESTA_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY,");
        eprintln!("  or add api_key to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let orchestrator = build(&config, &tenant)?;

    if let Some(msg) = message {
        return reply(&orchestrator, &tenant, &msg, stream, json).await;
    }

    println!();
    println!("  Orquesta: chat interactivo");
    println!("  Tenant:  {} ({})", tenant.tenant, tenant.plan);
    println!("  Model:   {}", orchestrator.model());
    println!("  Tools:   {}", orchestrator.registry().names().join(", "));
    println!();
    println!("  /stats muestra métricas, /cache el caché de decisiones, 'exit' para salir.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  Tú > ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/stats" => print!("{}", orchestrator.monitor().default_summary()),
            "/cache" => {
                let stats = orchestrator.decisions().cache().stats();
                println!(
                    "  entries: {} | hits: {} | misses: {}",
                    stats.entries, stats.hits, stats.misses
                );
            }
            _ => reply(&orchestrator, &tenant, line, stream, json).await?,
        }
    }

    Ok(())
}
