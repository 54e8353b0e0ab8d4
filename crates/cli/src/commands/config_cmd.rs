//! `orquesta config`: Configuration management commands.

use orquesta_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set ORQUESTA_API_KEY or OPENROUTER_API_KEY env var)");
            }
            if config.agent.time_budget_secs == 0 {
                warnings.push("agent.time_budget_secs = 0 disables the per-run time budget");
            }
            if !config.telemetry.enabled {
                warnings.push("Telemetry is disabled; /stats will stay empty");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:   {}", config.default_provider);
            println!("   Model:      {}", config.default_model);
            println!("   Fallbacks:  {}", config.fallback.len());
            println!(
                "   Decision:   analysis ≥ {}, tools ≥ {}, stream < {}",
                config.decision.analysis_threshold,
                config.decision.tools_threshold,
                config.decision.stream_threshold
            );
            println!(
                "   Agent:      {}..{} iterations, {}s budget",
                config.agent.base_iterations,
                config.agent.max_iterations,
                config.agent.time_budget_secs
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("   Config already exists at {}", config_path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("   ✅ Wrote {}", config_path.display());
    Ok(())
}
