use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::irc::commands;
use crate::irc::event::ChatEvent;
use crate::tts::SpeechSink;

use super::bus::EventBus;
use super::roster::{SUPPRESSION_WINDOW, ViewerRegistry};
use super::speech::{SpeechQueue, SpeechRequest, spawn_playback_worker};

/// Maximum bytes per IRC line (RFC 2812 says 512; Twitch tag blocks get
/// long, so allow 4096).
const MAX_LINE_LENGTH: usize = 4096;
/// How long a read may block before the loop re-checks the stop signal.
const READ_TIMEOUT: Duration = Duration::from_millis(500);
/// How long disconnect waits for each worker to wind down.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

/// Unique identifier for one connection to a channel.
pub type SessionId = Uuid;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to connect to {addr}: {source}")]
    Socket {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("handshake failed: {0}")]
    Handshake(#[from] std::io::Error),
}

/// One live connection to a channel: the ingestion worker, the playback
/// worker, and the shared stop signal. Exactly one at a time; created by
/// [`connect`], torn down by [`Session::disconnect`].
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub channel: String,
    pub connected_at: DateTime<Utc>,
    running: Arc<AtomicBool>,
    stop: CancellationToken,
    ingest: JoinHandle<()>,
    playback: JoinHandle<()>,
    bus: EventBus,
}

/// Open the socket, run the authentication/join handshake, and start the
/// ingestion loop and the playback worker. No retry on failure — the error
/// goes back to the caller, who decides what to do next.
pub async fn connect(
    channel: &str,
    settings: &Settings,
    bus: EventBus,
    sink: Box<dyn SpeechSink>,
) -> Result<Session, ConnectError> {
    let channel = channel.trim_start_matches('#').to_lowercase();
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    bus.status(format!("Connecting to {addr}..."));
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ConnectError::Socket {
            addr: addr.clone(),
            source,
        })?;
    bus.status("Connected to Twitch IRC server.");

    let (read_half, mut write_half) = stream.into_split();

    for line in [
        commands::pass(&settings.auth.token),
        commands::nick(&settings.auth.username),
        commands::cap_req(),
        commands::join(&channel),
    ] {
        send_line(&mut write_half, &line).await?;
    }
    bus.status(format!("Attempting to join channel #{channel}..."));

    let running = Arc::new(AtomicBool::new(true));
    let stop = CancellationToken::new();

    let (queue, queue_rx) = SpeechQueue::new(settings.max_queue_size);
    let playback = spawn_playback_worker(
        queue_rx,
        sink,
        settings.message_delay(),
        running.clone(),
        stop.clone(),
        bus.clone(),
    );

    let id = Uuid::new_v4();
    let ingest = tokio::spawn(
        Ingest {
            reader: BufReader::new(read_half),
            writer: write_half,
            channel: channel.clone(),
            registry: ViewerRegistry::new(bus.clone()),
            queue,
            settings: settings.clone(),
            bus: bus.clone(),
            running: running.clone(),
            stop: stop.clone(),
        }
        .run(),
    );

    info!(session = %id, %channel, "session started");

    Ok(Session {
        id,
        channel,
        connected_at: Utc::now(),
        running,
        stop,
        ingest,
        playback,
        bus,
    })
}

impl Session {
    /// Wind the session down: signal both workers, wait for them with a
    /// bounded timeout, and clear the displayed roster. A worker that does
    /// not stop in time is logged and left to die with the runtime, not
    /// force-killed.
    pub async fn disconnect(self) {
        info!(session = %self.id, channel = %self.channel, "disconnecting");
        self.running.store(false, Ordering::SeqCst);
        self.stop.cancel();

        for (name, handle) in [("ingest", self.ingest), ("playback", self.playback)] {
            match timeout(SHUTDOWN_WAIT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker = name, error = %e, "worker task failed"),
                Err(_) => warn!(worker = name, "worker did not stop within {SHUTDOWN_WAIT:?}"),
            }
        }

        self.bus.roster(Vec::new());
        self.bus.status("Disconnected.");
    }
}

/// Result of one buffered line read.
#[derive(Debug)]
enum LineRead {
    Line(String),
    Eof,
}

/// State owned by the ingestion worker. The registry (and with it the
/// roster and the suppression gate) lives and dies with this task; nothing
/// else touches it directly.
struct Ingest {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    channel: String,
    registry: ViewerRegistry,
    queue: SpeechQueue,
    settings: Settings,
    bus: EventBus,
    running: Arc<AtomicBool>,
    stop: CancellationToken,
}

impl Ingest {
    async fn run(mut self) {
        let stop = self.stop.clone();
        // Carries partial input across read timeouts; complete lines are
        // split off as they arrive.
        let mut pending = Vec::new();

        while self.running.load(Ordering::SeqCst) {
            let read = tokio::select! {
                _ = stop.cancelled() => break,
                read = timeout(READ_TIMEOUT, next_line(&mut self.reader, &mut pending)) => read,
            };

            let line = match read {
                // Idle: nothing arrived within the window; go re-check the
                // stop signal. Not an error.
                Err(_) => continue,
                Ok(Ok(LineRead::Line(line))) => line,
                Ok(Ok(LineRead::Eof)) => {
                    debug!("server closed the connection");
                    self.bus.status("Connection lost.");
                    break;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "read failed");
                    self.bus.status("Connection lost.");
                    break;
                }
            };

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            let event = ChatEvent::from_line(trimmed);
            self.dispatch(event).await;
        }
        // Both socket halves drop with self here, so the connection is
        // closed on the fatal-error path as well as on disconnect.
        debug!("ingestion loop stopped");
    }

    async fn dispatch(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Ping { token } => {
                // Answered before anything else from this batch is processed;
                // pings are never queued or delayed.
                if let Err(e) =
                    send_line(&mut self.writer, &commands::pong(token.as_deref())).await
                {
                    warn!(error = %e, "failed to answer ping");
                }
            }
            ChatEvent::RosterComplete => {
                self.bus.status(format!(
                    "Successfully joined #{}. Waiting for initial viewer list to populate...",
                    self.channel
                ));
                self.registry.arm_suppression_timer(SUPPRESSION_WINDOW);
            }
            ChatEvent::Join { user } => {
                if self.registry.join(&user) {
                    self.greet(&user);
                }
            }
            ChatEvent::Part { user } => {
                self.registry.part(&user);
            }
            ChatEvent::Message { user, text } => {
                if self.registry.observe_sender(&user) {
                    self.greet(&user);
                }
                self.bus.chat_line(format!("{user}: {text}"));

                if self.settings.is_blacklisted(&user) {
                    debug!(%user, "muted user, not announcing");
                    return;
                }
                let voice = self.settings.voice_for(&user).map(str::to_owned);
                let request = SpeechRequest::with_voice(format!("{user} says {text}"), voice);
                if !self.queue.try_enqueue(request) {
                    self.bus
                        .status(format!("TTS queue full, dropping message from {user}."));
                }
            }
            ChatEvent::Unparsed => trace!("ignoring unrecognized line"),
        }
    }

    /// Enqueue a welcome for a new arrival. Membership has already been
    /// updated; only this announcement is gated by the join-burst window
    /// and the blacklist.
    fn greet(&mut self, user: &str) {
        if self.registry.is_suppressed() {
            debug!(%user, "join burst suppressed, no greeting");
            return;
        }
        if self.settings.is_blacklisted(user) {
            debug!(%user, "muted user, no greeting");
            return;
        }
        let request = SpeechRequest::new(format!("Welcome to the stream, {user}!"));
        if !self.queue.try_enqueue(request) {
            self.bus
                .status(format!("TTS queue full, dropping join message for {user}."));
        }
    }
}

/// Read one complete line, capped at `MAX_LINE_LENGTH` bytes. Input is
/// accumulated in `pending`, which the caller owns: timing this future out
/// never loses partial data, and the next call picks up where it left off.
/// Returns `Eof` on a clean close (an incomplete trailing line is dropped).
async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    pending: &mut Vec<u8>,
) -> std::io::Result<LineRead> {
    loop {
        if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            return Ok(LineRead::Line(String::from_utf8_lossy(&raw).into_owned()));
        }
        if pending.len() >= MAX_LINE_LENGTH {
            pending.clear();
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "line exceeds maximum length",
            ));
        }

        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(LineRead::Eof);
        }
        let n = available.len();
        pending.extend_from_slice(available);
        reader.consume(n);
    }
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(format!("{line}\r\n").as_bytes()).await
}
