//! Ordered, cancellable speech playback.
//!
//! Texts are synthesized and played one at a time in enqueue order. The
//! next item is only started once the previous one has finished playing,
//! so a slow synthesis can never be overtaken by a faster later one.
//!
//! [`AudioQueue::cancel_all`] is synchronous: when it returns the pending
//! items are gone, the queue reports idle, and the in-flight item's
//! playback future is being dropped by its worker. A worker started before
//! the cancel never touches the queue again.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::playback::AudioSink;
use super::speech::SpeechSynthesizer;

/// One unit of speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTask {
    /// Text to speak.
    pub text: String,
    /// Strictly increasing across the queue's lifetime.
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<AudioTask>,
    /// Token of the item being synthesized or played.
    speaking: Option<(u64, CancellationToken)>,
    worker_active: bool,
    next_sequence: u64,
    /// Bumped by every cancel; workers from older generations exit.
    generation: u64,
}

struct Inner {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    state: Mutex<QueueState>,
    idle: watch::Sender<bool>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// FIFO of speech items with a single "currently speaking" slot.
#[derive(Clone)]
pub struct AudioQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("AudioQueue")
            .field("pending", &state.pending.len())
            .field("speaking", &state.speaking.as_ref().map(|(seq, _)| *seq))
            .field("generation", &state.generation)
            .finish()
    }
}

impl AudioQueue {
    /// Create an idle queue.
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                synthesizer,
                sink,
                state: Mutex::new(QueueState::default()),
                idle,
            }),
        }
    }

    /// Append `text` and start processing if idle.
    ///
    /// Whitespace-only text is ignored. Returns the task's sequence number.
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, text: impl Into<String>) -> Option<u64> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }

        let mut state = self.inner.state();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.pending.push_back(AudioTask { text, sequence });

        if !state.worker_active {
            state.worker_active = true;
            let generation = state.generation;
            self.inner.idle.send_replace(false);
            tokio::spawn(run_worker(Arc::clone(&self.inner), generation));
        }
        Some(sequence)
    }

    /// Stop the in-flight item, discard everything pending, and go idle.
    pub fn cancel_all(&self) {
        let mut state = self.inner.state();
        let dropped = state.pending.len();
        state.pending.clear();
        if let Some((sequence, token)) = state.speaking.take() {
            debug!(sequence, "cancelling in-flight speech");
            token.cancel();
        }
        state.worker_active = false;
        state.generation += 1;
        self.inner.idle.send_replace(true);
        if dropped > 0 {
            debug!(dropped, "discarded pending speech");
        }
    }

    /// Whether nothing is pending or playing.
    pub fn is_idle(&self) -> bool {
        *self.inner.idle.borrow()
    }

    /// Number of items waiting behind the current one.
    pub fn pending_len(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Sequence number of the item being synthesized or played.
    pub fn speaking(&self) -> Option<u64> {
        self.inner.state().speaking.as_ref().map(|(seq, _)| *seq)
    }

    /// Wait until the queue is idle.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

async fn run_worker(inner: Arc<Inner>, generation: u64) {
    loop {
        let (task, token) = {
            let mut state = inner.state();
            if state.generation != generation {
                return;
            }
            let Some(task) = state.pending.pop_front() else {
                state.worker_active = false;
                state.speaking = None;
                inner.idle.send_replace(true);
                return;
            };
            let token = CancellationToken::new();
            state.speaking = Some((task.sequence, token.clone()));
            (task, token)
        };

        tokio::select! {
            _ = token.cancelled() => {
                debug!(sequence = task.sequence, "speech cancelled");
                return;
            }
            _ = speak(&inner, &task) => {}
        }

        let mut state = inner.state();
        if state.generation != generation {
            return;
        }
        state.speaking = None;
    }
}

/// Synthesize and play one task. Failures skip the item.
async fn speak(inner: &Inner, task: &AudioTask) {
    let audio = match inner.synthesizer.synthesize(&task.text).await {
        Ok(audio) => audio,
        Err(e) => {
            warn!(sequence = task.sequence, error = %e, "speech synthesis failed; skipping");
            return;
        }
    };
    if let Err(e) = inner.sink.play(audio).await {
        warn!(sequence = task.sequence, error = %e, "playback failed; skipping");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::error::{RelayError, Result};

    /// Echoes the text as audio after a per-text delay.
    struct EchoSynth {
        slow: &'static str,
    }

    #[async_trait]
    impl SpeechSynthesizer for EchoSynth {
        async fn synthesize(&self, text: &str) -> Result<Bytes> {
            if text == "bad" {
                return Err(RelayError::Speech("refused".into()));
            }
            if text == self.slow {
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            Ok(Bytes::from(text.to_owned()))
        }
    }

    /// Records which items started and which finished playing.
    #[derive(Default)]
    struct RecordingSink {
        play_for: Duration,
        started: Mutex<Vec<String>>,
        finished: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn started(&self) -> Vec<String> {
            self.started.lock().map(|v| v.clone()).unwrap_or_default()
        }

        fn finished(&self) -> Vec<String> {
            self.finished.lock().map(|v| v.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, audio: Bytes) -> Result<()> {
            let text = String::from_utf8_lossy(&audio).into_owned();
            if let Ok(mut started) = self.started.lock() {
                started.push(text.clone());
            }
            tokio::time::sleep(self.play_for).await;
            if let Ok(mut finished) = self.finished.lock() {
                finished.push(text);
            }
            Ok(())
        }
    }

    fn queue(slow: &'static str, play_for: Duration) -> (AudioQueue, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink {
            play_for,
            ..RecordingSink::default()
        });
        let queue = AudioQueue::new(Arc::new(EchoSynth { slow }), sink.clone());
        (queue, sink)
    }

    async fn wait_started(sink: &RecordingSink, text: &str) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while !sink.started().iter().any(|t| t == text) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "{text} never started");
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    // ── ordering ──────────────────────────────────────────────

    #[tokio::test]
    async fn plays_in_enqueue_order_despite_slow_synthesis() {
        let (queue, sink) = queue("A", Duration::from_millis(5));
        let sequences: Vec<_> = ["A", "B", "C"]
            .iter()
            .filter_map(|t| queue.enqueue(*t))
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(!queue.is_idle());

        queue.wait_idle().await;
        assert_eq!(sink.finished(), strings(&["A", "B", "C"]));
        assert_eq!(queue.speaking(), None);
    }

    #[tokio::test]
    async fn playback_never_overlaps() {
        let (queue, sink) = queue("", Duration::from_millis(30));
        queue.enqueue("one");
        queue.enqueue("two");
        wait_started(&sink, "one").await;
        assert_eq!(sink.started(), strings(&["one"]));
        queue.wait_idle().await;
        assert_eq!(sink.started(), strings(&["one", "two"]));
    }

    #[tokio::test]
    async fn whitespace_is_not_enqueued() {
        let (queue, _sink) = queue("", Duration::ZERO);
        assert_eq!(queue.enqueue("  \n"), None);
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn synthesis_failure_skips_item() {
        let (queue, sink) = queue("", Duration::ZERO);
        queue.enqueue("first");
        queue.enqueue("bad");
        queue.enqueue("last");
        queue.wait_idle().await;
        assert_eq!(sink.finished(), strings(&["first", "last"]));
    }

    #[tokio::test]
    async fn restarts_after_draining() {
        let (queue, sink) = queue("", Duration::ZERO);
        queue.enqueue("a");
        queue.wait_idle().await;
        assert_eq!(queue.enqueue("b"), Some(1));
        queue.wait_idle().await;
        assert_eq!(sink.finished(), strings(&["a", "b"]));
    }

    // ── cancellation ──────────────────────────────────────────

    #[tokio::test]
    async fn cancel_during_playback_discards_rest() {
        let (queue, sink) = queue("", Duration::from_millis(100));
        queue.enqueue("A");
        queue.enqueue("B");
        queue.enqueue("C");
        wait_started(&sink, "B").await;

        queue.cancel_all();
        assert!(queue.is_idle());
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.speaking(), None);

        let d = queue.enqueue("D");
        assert_eq!(d, Some(3));
        queue.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(sink.started(), strings(&["A", "B", "D"]));
        assert_eq!(sink.finished(), strings(&["A", "D"]));
    }

    #[tokio::test]
    async fn cancel_when_idle_is_harmless() {
        let (queue, sink) = queue("", Duration::ZERO);
        queue.cancel_all();
        queue.cancel_all();
        queue.enqueue("x");
        queue.wait_idle().await;
        assert_eq!(sink.finished(), strings(&["x"]));
    }
}
