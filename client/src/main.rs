use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use herald_client::config::Settings;
use herald_client::engine::bus::EventBus;
use herald_client::engine::connection;
use herald_client::tts::{EspeakSink, NullSink, SpeechSink};
use herald_client::ui::{self, TerminalDisplay};

/// Reads a Twitch channel's chat and announces messages and new arrivals
/// out loud.
#[derive(Parser)]
#[command(name = "herald", version, about)]
struct Args {
    /// Channel to join (defaults to the last connected channel).
    channel: Option<String>,

    /// Path to the settings file.
    #[arg(long, default_value = "herald.toml")]
    config: PathBuf,

    /// Disable speech output.
    #[arg(long)]
    mute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(&args.config)?;

    let channel = args
        .channel
        .or_else(|| (!settings.last_channel.is_empty()).then(|| settings.last_channel.clone()));
    let Some(channel) = channel else {
        bail!("no channel given and no previous channel saved; run `herald <channel>`");
    };
    let channel = channel.trim_start_matches('#').to_lowercase();

    if settings.auth.token.is_empty() || settings.auth.username.is_empty() {
        bail!(
            "auth.token and auth.username must be set in {} (or via HERALD_TOKEN / HERALD_USERNAME)",
            args.config.display()
        );
    }

    // Persist the channel so the next run can default to it.
    settings.last_channel = channel.clone();
    settings.save(&args.config)?;

    let sink: Box<dyn SpeechSink> = if args.mute {
        Box::new(NullSink)
    } else {
        Box::new(EspeakSink::new(&settings).context("speech synthesis unavailable (try --mute)")?)
    };

    let (bus, bus_rx) = EventBus::new();
    let shutdown = CancellationToken::new();
    let consumer = tokio::spawn(ui::run_consumer(
        bus_rx,
        Box::new(TerminalDisplay),
        settings.max_chat_lines,
        shutdown.clone(),
    ));

    let session = connection::connect(&channel, &settings, bus.clone(), sink)
        .await
        .context("connection failed")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    session.disconnect().await;
    shutdown.cancel();
    let _ = consumer.await;

    Ok(())
}
