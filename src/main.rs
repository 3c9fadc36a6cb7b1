use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use induction_realtime::error::{PlaybackError, UserFacing};
use induction_realtime::host::MediaElement;
use induction_realtime::transcript::TranscriptEntry;
use induction_realtime::types::Playlist;
use induction_realtime::{command, playlist, session};
use induction_realtime::{Config, MediaTracks, PlaybackController, PlaybackMode};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Narrated site induction playback")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the directive carried by a line of narration
    Parse { text: String },
    /// Obtain a realtime session and print the model that accepted it
    Session {
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long, default_value = "Induction")]
        site: String,
    },
    /// Drive prerecorded playback from stdin
    Simulate {
        #[arg(long, default_value = "en")]
        lang: String,
        /// Directory holding `<locale>/<step id>.mp3` narration tracks
        #[arg(long, default_value = "audio")]
        narration_root: String,
    },
}

/// A media element that only reports what it was asked to do.
struct LoggedMedia {
    name: &'static str,
}

#[async_trait]
impl MediaElement for LoggedMedia {
    fn load(&self, src: &str) {
        tracing::info!("[{}] load {}", self.name, src);
    }

    fn rewind(&self) {
        tracing::debug!("[{}] rewind", self.name);
    }

    fn pause(&self) {
        tracing::info!("[{}] pause", self.name);
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        tracing::info!("[{}] play", self.name);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    match args.command {
        Command::Parse { text } => {
            match command::parse(&text) {
                Some(directive) => println!("{:?}", directive),
                None => println!("no directive"),
            }
            println!("spoken: {}", command::strip_markers(&text));
        }
        Command::Session { lang, site } => {
            let source = session::from_config(&config).context("Failed to set up session source")?;
            let playlist = Playlist::new(&site, &lang, Vec::new());
            let descriptor = source
                .open_session(&playlist)
                .await
                .context("Failed to obtain a realtime session")?;
            println!("session ready on model {}", descriptor.model_id());
        }
        Command::Simulate {
            lang,
            narration_root,
        } => simulate(&config, &lang, narration_root).await?,
    }
    Ok(())
}

async fn simulate(config: &Config, lang: &str, narration_root: String) -> Result<()> {
    let source = playlist::from_source(&config.playlist_source);
    let playlist = match source.load(lang).await {
        Ok(playlist) => playlist,
        Err(e) => {
            tracing::error!("{}", e.detail().unwrap_or_default());
            anyhow::bail!("{}", e.summary());
        }
    };

    let controller = PlaybackController::new(
        PlaybackMode::Prerecorded { narration_root },
        MediaTracks {
            video: Arc::new(LoggedMedia { name: "video" }),
            narration: Arc::new(LoggedMedia { name: "narration" }),
        },
    );
    controller.load_playlist(playlist);
    tracing::info!("Ready. Commands: start, stop, next, prev, replay, ended, quit. Anything else is narration.");

    let mut printed = 0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "start" => {
                if let Err(e) = controller.start().await {
                    eprintln!("{}", e.summary());
                }
            }
            "stop" => controller.stop(),
            "next" => {
                controller.next().await;
            }
            "prev" => {
                controller.prev().await;
            }
            "replay" => controller.replay().await,
            "ended" => controller.on_media_ended().await,
            text => controller.handle_text(text).await,
        }

        printed = print_new_entries(&controller.transcript(), printed);
        let state = controller.state();
        match controller.current_step() {
            Some(step) if state.session_active => {
                println!("-> step {} ({})", state.current_index + 1, step.id())
            }
            _ => println!("-> idle"),
        }
    }

    controller.stop();
    Ok(())
}

/// Prints entries newer than `after` and returns the newest id seen.
fn print_new_entries(entries: &[TranscriptEntry], after: u64) -> u64 {
    let mut newest = after;
    for entry in entries.iter().filter(|e| e.id > after) {
        println!("{} {:?}: {}", entry.timestamp.format("%H:%M:%S"), entry.role, entry.text);
        newest = entry.id;
    }
    newest
}
