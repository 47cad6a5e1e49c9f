//! fable-player - command-line playback shell
//!
//! Restores the persisted global-player state, optionally starts a chapter
//! from the command line, and prints progress until ctrl-c. Mostly a
//! manual-testing harness for the playback core.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fable_player::{Chapter, GlobalPlayer, PlayerConfig, PlayerContext};

/// Command-line arguments for fable-player
#[derive(Parser, Debug)]
#[command(name = "fable-player")]
#[command(about = "Playback shell for the fable audiobook client")]
#[command(version)]
struct Args {
    /// Configuration file (TOML); defaults apply when absent
    #[arg(short, long, env = "FABLE_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog backend base URL (overrides the config file)
    #[arg(long, env = "FABLE_API_BASE")]
    api_base: Option<String>,

    /// Audio source to play: storage path, URL, or local file
    #[arg(long)]
    src: Option<String>,

    /// Book id for the played source
    #[arg(long, default_value = "cli-book")]
    book: String,

    /// Chapter id for the played source
    #[arg(long, default_value = "cli-chapter")]
    chapter: String,

    /// Start position in seconds
    #[arg(long)]
    start: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fable_player=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    if let Some(api_base) = args.api_base {
        config.api_base = api_base;
    }

    info!(api_base = %config.api_base, "Starting fable playback shell");

    let player = GlobalPlayer::new(PlayerContext::new(config));

    if let Some(src) = args.src {
        let chapter = Chapter {
            id: args.chapter.clone(),
            title: args.chapter.clone(),
            audio_source: src,
            duration: 0.0,
            format: None,
        };
        player.play_chapter(&args.book, &chapter, args.start);
    } else if player.current_chapter_id().is_some() {
        info!(
            chapter_id = %player.current_chapter_id().unwrap_or_default(),
            position = player.current_time(),
            "Resuming restored session"
        );
        player.play();
    } else {
        info!("Nothing to play; pass --src or run after a previous session");
        return Ok(());
    }

    let mut observer = player.subscribe();
    loop {
        tokio::select! {
            view = observer.changed() => {
                println!(
                    "{:>8} {:7.1}s / {:7.1}s",
                    format!("{:?}", view.status).to_lowercase(),
                    view.current_time,
                    view.duration
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down");
    drop(player);
    Ok(())
}
