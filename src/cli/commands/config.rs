use anyhow::{Context, Result};
use clap::Subcommand;
use std::process::Command;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show configuration file path")]
    Path,
    #[command(about = "Edit configuration file")]
    Edit,
}

pub async fn handle_config(
    cmd: ConfigCommand,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(force, format),
        ConfigCommand::Show => handle_show(config, format),
        ConfigCommand::Path => handle_path(),
        ConfigCommand::Edit => handle_edit(format),
    }
}

fn config_path() -> Result<std::path::PathBuf> {
    Config::config_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(force: bool, format: OutputFormat) -> Result<()> {
    let path = config_path()?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default().save().context("failed to write config")?;
    print!(
        "{}",
        get_formatter(format).format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

fn handle_path() -> Result<()> {
    let path = config_path()?;
    let state = if path.exists() { "active" } else { "would be" };
    println!("Config file ({state}): {}", path.display());

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        let state = if env_path.exists() { "active" } else { "would be" };
        println!(".env file ({state}): {}", env_path.display());
    }
    Ok(())
}

fn handle_edit(format: OutputFormat) -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        handle_init(false, format)?;
    }

    let editor = std::env::var("EDITOR")
        .unwrap_or_else(|_| std::env::var("VISUAL").unwrap_or_else(|_| "vim".into()));

    Command::new(&editor)
        .arg(&path)
        .status()
        .context(format!("failed to open editor: {}", editor))?;

    Ok(())
}
