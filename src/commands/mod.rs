use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::catalog::{Game, FREEDOOM_DATA_DIR};
use crate::errors::{PipelineError, PipelineResult};
use crate::models::{ProgressEvent, ProgressPhase};
use crate::platform::PlatformProfile;
use crate::services::game_launcher::GameLauncher;
use crate::services::pipeline::InstallPipeline;
use crate::utils::paths::DataLayout;

/// Install a package, rendering fetch progress on the terminal. Ctrl-C
/// cancels the in-flight download and leaves no partial file behind.
pub async fn install(pipeline: Arc<InstallPipeline>, package_id: &str) -> PipelineResult<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(rx));

    let canceller = {
        let pipeline = Arc::clone(&pipeline);
        let package_id = package_id.to_string();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("cancel requested for {}", package_id);
                pipeline.cancel_install(&package_id);
            }
        })
    };

    let result = pipeline.install(package_id, Some(tx)).await;
    canceller.abort();
    let _ = renderer.await;

    let path = result?;
    println!("{} installed to {}", package_id, path.display());
    Ok(())
}

pub fn launch(pipeline: &InstallPipeline, game_id: &str) -> PipelineResult<()> {
    let game =
        Game::parse(game_id).ok_or_else(|| PipelineError::UnknownGame(game_id.to_string()))?;
    pipeline.launch(game)?;
    println!("{} started", game);
    Ok(())
}

/// Reports what the data directory currently holds; nothing here touches
/// the network.
pub fn status(layout: &DataLayout, profile: &PlatformProfile) {
    println!("data directory: {}", layout.data_dir().display());

    let launcher = GameLauncher::new(*profile, layout.data_dir());
    match launcher.resolve_executable() {
        Ok(executable) => {
            let installed = executable.is_file();
            println!(
                "source port: {}",
                if installed { "installed" } else { "not installed" }
            );
        }
        Err(_) => println!("source port: not supported on {}", profile.platform),
    }

    for game in Game::ALL {
        let wad = layout.data_dir().join(FREEDOOM_DATA_DIR).join(game.wad_file());
        println!("{}: {}", game, if wad.is_file() { "ready" } else { "missing" });
    }
}

async fn render_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let mut bar: Option<ProgressBar> = None;
    while let Some(event) = rx.recv().await {
        match event.phase {
            ProgressPhase::Downloading => {
                let bar = bar.get_or_insert_with(|| new_bar(&event));
                bar.set_position(event.downloaded_bytes);
            }
            ProgressPhase::Finished => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
                println!(
                    "downloaded {} ({} bytes)",
                    event.filename, event.downloaded_bytes
                );
            }
        }
    }
}

fn new_bar(event: &ProgressEvent) -> ProgressBar {
    let bar = if event.total_bytes > 0 {
        let bar = ProgressBar::new(event.total_bytes);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes} ({eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    } else {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{msg} {spinner} {bytes}") {
            bar.set_style(style);
        }
        bar
    };
    bar.set_message(event.filename.clone());
    bar
}
