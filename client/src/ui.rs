//! Display side: the trait the consumer drives, a plain terminal
//! implementation, and the polling drain loop with its bounded chat log.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::events::UiEvent;

/// How often the consumer drains the bus.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The rendering surface. One implementation per front end; the pipeline
/// only ever talks to this trait, from the single consumer task.
pub trait DisplaySink: Send {
    fn status(&mut self, text: &str);
    fn append_line(&mut self, text: &str);
    fn set_roster(&mut self, viewers: &[String]);
}

/// Plain stdout rendering.
pub struct TerminalDisplay;

impl DisplaySink for TerminalDisplay {
    fn status(&mut self, text: &str) {
        println!("* {text}");
    }

    fn append_line(&mut self, text: &str) {
        println!("{text}");
    }

    fn set_roster(&mut self, viewers: &[String]) {
        println!("= viewers ({}): {}", viewers.len(), viewers.join(", "));
    }
}

/// The visible chat log: keeps only the most recent `capacity` lines,
/// dropping the oldest as new ones arrive.
pub struct ChatLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> ChatLog {
        ChatLog {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

/// Drain every available event on a fixed interval and apply it, in enqueue
/// order, to the display. All blocking stays in the workers; this task only
/// polls. Returns the final chat log on shutdown.
pub async fn run_consumer(
    mut rx: mpsc::UnboundedReceiver<UiEvent>,
    mut display: Box<dyn DisplaySink>,
    max_chat_lines: usize,
    shutdown: CancellationToken,
) -> ChatLog {
    let mut log = ChatLog::new(max_chat_lines);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                while let Ok(event) = rx.try_recv() {
                    apply(event, display.as_mut(), &mut log);
                }
            }
        }
    }
    // Final drain so late events (e.g. the disconnect status) still render.
    while let Ok(event) = rx.try_recv() {
        apply(event, display.as_mut(), &mut log);
    }
    debug!("display consumer stopped");
    log
}

fn apply(event: UiEvent, display: &mut dyn DisplaySink, log: &mut ChatLog) {
    match event {
        UiEvent::Status(text) => display.status(&text),
        UiEvent::ChatLine(text) => {
            log.push(text.clone());
            display.append_line(&text);
        }
        UiEvent::RosterUpdate(viewers) => display.set_roster(&viewers),
    }
}
