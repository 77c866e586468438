mod catalog;
mod commands;
mod errors;
mod logging;
mod models;
mod platform;
mod services;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::catalog::Catalog;
use crate::platform::PlatformProfile;
use crate::services::pipeline::InstallPipeline;
use crate::utils::paths::{resolve_log_dir, DataLayout};

#[derive(Parser, Debug)]
#[command(
    name = "doomdash",
    version,
    about = "Install and launch the UZDoom source port with Freedoom game data"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Download and install a package ("uzdoom" or "freedoom")
    Install { package: String },
    /// Start an installed game ("freedoom-1" or "freedoom-2")
    Launch { game: String },
    /// Show what the data directory currently holds
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let layout = DataLayout::resolve();
    if let Err(err) = logging::init(&resolve_log_dir(layout.data_dir())) {
        eprintln!("warning: file logging disabled: {err}");
    }

    let profile = PlatformProfile::current();
    let pipeline = Arc::new(InstallPipeline::new(
        Catalog::builtin(),
        profile,
        layout.clone(),
    ));

    let result = match cli.command {
        CliCommand::Install { package } => commands::install(pipeline, &package).await,
        CliCommand::Launch { game } => commands::launch(&pipeline, &game),
        CliCommand::Status => {
            commands::status(&layout, &profile);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
