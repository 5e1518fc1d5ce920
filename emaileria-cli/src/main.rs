//! emaileria CLI tool

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use emaileria::config::EmaileriaConfig;
use emaileria::observability;
use emaileria_cli::commands::{check, preview, send, FatalExt};
use emaileria_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings = EmaileriaConfig::load(cli.config.as_deref()).fatal()?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        settings.logging.format = format.into();
    }
    observability::init(&settings.logging)?;

    match cli.command {
        Commands::Send(args) => {
            let summary = send::execute(&args, &settings).await?;
            if summary.is_some_and(|summary| summary.failed > 0) {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Check(args) => {
            check::execute(&args, &settings)?;
        }
        Commands::Preview(args) => {
            preview::execute(&args, &settings)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
