use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tts::SpeechSink;
use super::bus::EventBus;

/// How long the playback worker waits on an empty queue before re-checking
/// the stop signal.
const DEQUEUE_WAIT: Duration = Duration::from_secs(1);

/// One utterance waiting for playback.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    /// Per-user voice override; `None` uses the configured default voice.
    pub voice: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_voice(text, None)
    }

    pub fn with_voice(text: impl Into<String>, voice: Option<String>) -> Self {
        Self {
            text: text.into(),
            voice,
            enqueued_at: Utc::now(),
        }
    }
}

/// Bounded handoff between the ingestion loop and the playback worker.
/// Enqueueing never blocks and never evicts: at capacity the request is
/// rejected and the caller reports the drop.
pub struct SpeechQueue {
    tx: mpsc::Sender<SpeechRequest>,
}

impl SpeechQueue {
    pub fn new(capacity: usize) -> (SpeechQueue, mpsc::Receiver<SpeechRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (SpeechQueue { tx }, rx)
    }

    /// Try to append a request. Returns false when the queue is at capacity
    /// or the worker is gone.
    pub fn try_enqueue(&self, request: SpeechRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                debug!(text = %request.text, "speech queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                debug!(text = %request.text, "speech queue closed");
                false
            }
        }
    }
}

/// Start the playback worker: dequeue one request at a time, speak it (the
/// sink blocks for the duration of the utterance), then pause for the
/// configured delay. Utterance length plus fixed delay is the rate limit
/// that keeps announcements from overlapping or running together.
///
/// On stop, whatever is still queued is stale and dropped unspoken.
pub fn spawn_playback_worker(
    mut rx: mpsc::Receiver<SpeechRequest>,
    mut sink: Box<dyn SpeechSink>,
    delay: Duration,
    running: Arc<AtomicBool>,
    stop: CancellationToken,
    bus: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("playback worker started");
        while running.load(Ordering::SeqCst) {
            let request = tokio::select! {
                _ = stop.cancelled() => break,
                polled = timeout(DEQUEUE_WAIT, rx.recv()) => match polled {
                    Err(_) => continue, // queue idle, re-check the stop signal
                    Ok(None) => break,  // queue handle dropped
                    Ok(Some(request)) => request,
                },
            };

            let queued_ms = Utc::now()
                .signed_duration_since(request.enqueued_at)
                .num_milliseconds();
            debug!(text = %request.text, queued_ms, "speaking");

            // The sink blocks until the utterance finishes; keep that off
            // the async workers.
            let spoken = tokio::task::spawn_blocking(move || {
                let result = sink.speak(&request);
                (sink, result)
            })
            .await;

            match spoken {
                Ok((returned, Ok(()))) => sink = returned,
                Ok((returned, Err(e))) => {
                    sink = returned;
                    warn!(error = %e, "speech synthesis failed");
                    bus.status(format!("Speech error: {e}"));
                }
                Err(e) => {
                    warn!(error = %e, "speech task failed, stopping playback");
                    break;
                }
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        rx.close();
        debug!("playback worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::testing::RecordingSink;

    #[tokio::test]
    async fn test_enqueue_beyond_capacity_rejected_without_blocking() {
        let (queue, _rx) = SpeechQueue::new(10);

        let mut accepted = 0;
        let mut rejected = 0;
        for i in 0..15 {
            if queue.try_enqueue(SpeechRequest::new(format!("message {i}"))) {
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        assert_eq!(accepted, 10);
        assert_eq!(rejected, 5);
    }

    #[tokio::test]
    async fn test_queue_frees_a_slot_per_dequeue() {
        let (queue, mut rx) = SpeechQueue::new(2);
        assert!(queue.try_enqueue(SpeechRequest::new("a")));
        assert!(queue.try_enqueue(SpeechRequest::new("b")));
        assert!(!queue.try_enqueue(SpeechRequest::new("c")));

        rx.recv().await.unwrap();
        assert!(queue.try_enqueue(SpeechRequest::new("d")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_worker_speaks_in_fifo_order() {
        let (queue, rx) = SpeechQueue::new(10);
        let (sink, transcript) = RecordingSink::new();
        let running = Arc::new(AtomicBool::new(true));
        let stop = CancellationToken::new();
        let (bus, _bus_rx) = EventBus::new();

        let worker = spawn_playback_worker(
            rx,
            Box::new(sink),
            Duration::ZERO,
            running.clone(),
            stop.clone(),
            bus,
        );

        for text in ["first", "second", "third"] {
            assert!(queue.try_enqueue(SpeechRequest::new(text)));
        }

        timeout(Duration::from_secs(5), async {
            loop {
                if transcript.lock().unwrap().len() == 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker never drained the queue");

        assert_eq!(*transcript.lock().unwrap(), vec!["first", "second", "third"]);

        stop.cancel();
        running.store(false, Ordering::SeqCst);
        timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_discards_pending_requests() {
        let (queue, rx) = SpeechQueue::new(10);
        let (sink, transcript) = RecordingSink::new();
        let running = Arc::new(AtomicBool::new(true));
        let stop = CancellationToken::new();
        let (bus, _bus_rx) = EventBus::new();

        // A long inter-message delay keeps the worker parked after the first
        // utterance, with the rest still queued.
        let worker = spawn_playback_worker(
            rx,
            Box::new(sink),
            Duration::from_secs(60),
            running.clone(),
            stop.clone(),
            bus,
        );

        for text in ["spoken", "discarded 1", "discarded 2"] {
            assert!(queue.try_enqueue(SpeechRequest::new(text)));
        }

        timeout(Duration::from_secs(5), async {
            loop {
                if !transcript.lock().unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("nothing was spoken");

        running.store(false, Ordering::SeqCst);
        stop.cancel();
        timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker did not stop promptly")
            .unwrap();

        assert_eq!(*transcript.lock().unwrap(), vec!["spoken"]);
    }
}
