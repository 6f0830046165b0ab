//! Config command - inspect the effective configuration.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML (default)
    Show,

    /// Show which config files were consulted and their precedence
    Which,

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    print!("{}", ctx.config.resolved().to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");
    for source in &ctx.sources {
        let status = if source.loaded { "loaded" } else { "not found" };
        println!("  {:<10} {}", status, source.path.display());
    }
    println!();

    let loaded = ctx.sources.iter().filter(|s| s.loaded).count();
    if loaded == 0 {
        println!("No config files found, using defaults.");
    } else {
        println!("{} config file(s) loaded.", loaded);
    }

    for warning in &ctx.warnings {
        println!("warning: {}", warning);
    }
    Ok(())
}

fn cmd_path() -> Result<()> {
    match msm_config::xdg_config_path() {
        Some(path) => println!("{}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}
