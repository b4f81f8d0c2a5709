//! `pflow config`: check and print the effective configuration.

use clap::Subcommand;

use parcelflow_config::{resolve_credentials, Settings};

use crate::context::Context;
use crate::exit_codes::EXIT_CONFIG_INVALID;
use crate::{CliError, GlobalArgs};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Report every problem that would stop a shipment pass
    #[command(after_help = "\
Examples:
  pflow config validate
  pflow --config ./parcelflow.toml config validate --json")]
    Validate {
        /// Print JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML (password redacted)
    Show,

    /// Print the default config file location
    Path,
}

pub fn cmd_config(global: &GlobalArgs, cmd: ConfigCommands) -> Result<(), CliError> {
    match cmd {
        ConfigCommands::Validate { json } => cmd_validate(global, json),
        ConfigCommands::Show => cmd_show(global),
        ConfigCommands::Path => {
            println!("{}", Settings::config_path().display());
            Ok(())
        }
    }
}

fn cmd_validate(global: &GlobalArgs, json: bool) -> Result<(), CliError> {
    let ctx = Context::load(global)?;
    let mut problems = ctx.settings.problems();
    let credentials =
        resolve_credentials(&ctx.settings.carrier, global.user.as_deref(), global.password.as_deref());
    if let Err(e) = &credentials {
        problems.push(e.to_string());
    }

    let source = ctx
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".into());

    if json {
        let value = serde_json::json!({
            "config": ctx.config_path,
            "valid": problems.is_empty(),
            "problems": problems,
            "credentials": credentials.as_ref().ok().map(|c| serde_json::json!({
                "user": c.user_source.as_str(),
                "password": c.password_source.as_str(),
            })),
        });
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{text}");
    }

    if problems.is_empty() {
        eprintln!("config ok ({source})");
        return Ok(());
    }

    if !json {
        for problem in &problems {
            eprintln!("  - {problem}");
        }
    }
    Err(CliError::new(
        EXIT_CONFIG_INVALID,
        format!("{} problem(s) in config ({source})", problems.len()),
    ))
}

fn cmd_show(global: &GlobalArgs) -> Result<(), CliError> {
    let ctx = Context::load(global)?;
    let mut settings = ctx.settings;
    if settings.carrier.password.is_some() {
        settings.carrier.password = Some("<redacted>".into());
    }
    let text = toml::to_string_pretty(&settings)
        .map_err(|e| CliError::new(crate::exit_codes::EXIT_ERROR, format!("cannot render config: {e}")))?;
    print!("{text}");
    Ok(())
}
