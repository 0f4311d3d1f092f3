use anyhow::{Context, Result};
use clap::Subcommand;
use std::process::Command;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{CONFIG_PATH_ENV, Config, OutputFormat};

const REDACTED: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file path")]
    Path,
    #[command(about = "Edit configuration file")]
    Edit,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => handle_init(force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(),
        ConfigCommand::Edit => handle_edit(formatter.as_ref()),
    }
}

fn config_path() -> Result<std::path::PathBuf> {
    Config::config_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(force: bool, formatter: &dyn Formatter) -> Result<()> {
    let path = config_path()?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(&path)
        .context("failed to create config")?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );

    Ok(())
}

/// Loaded config with credentials masked.
fn redacted(mut config: Config) -> Config {
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some(REDACTED.to_string());
    }
    if config.generation.api_key.is_some() {
        config.generation.api_key = Some(REDACTED.to_string());
    }
    config
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let config = redacted(Config::load()?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path().filter(|p| p.exists()) {
        println!("# Config file: {}", path.display());
    } else {
        println!("# No config file; showing defaults");
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn handle_path() -> Result<()> {
    let path = config_path()?;
    let state = if path.exists() { "active" } else { "would be" };
    println!("Config file ({}): {}", state, path.display());

    if std::env::var(CONFIG_PATH_ENV).is_ok() {
        println!("  (set by {})", CONFIG_PATH_ENV);
    }

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        }
    }

    Ok(())
}

fn handle_edit(formatter: &dyn Formatter) -> Result<()> {
    let path = config_path()?;

    if !path.exists() {
        Config::default()
            .save_to(&path)
            .context("failed to create config")?;
        print!(
            "{}",
            formatter.format_message(&format!("Created config at: {}", path.display()))
        );
    }

    let editor = std::env::var("EDITOR")
        .unwrap_or_else(|_| std::env::var("VISUAL").unwrap_or_else(|_| "vim".into()));

    Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("failed to open editor: {}", editor))?;

    Ok(())
}
