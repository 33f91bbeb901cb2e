//! Client-side turn driver.
//!
//! A [`ChatSession`] owns one conversation and runs at most one turn at a
//! time. Each turn streams the relay's response through a
//! [`StreamDecoder`], applies the events to the conversation with the pure
//! reducers, publishes every new snapshot on a `watch` channel, and hands
//! completed sentences to the [`AudioQueue`].
//!
//! Every turn carries a generation number. Aborting bumps the generation
//! under the conversation lock, so a decode loop that is still draining a
//! stale stream can never mutate the conversation again.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio_queue::AudioQueue;
use super::conversation::{
    Conversation, append_turn, apply_event, edit_and_truncate, mark_failed, mark_interrupted,
    regenerate_from, truncate_from,
};
use super::decoder::StreamDecoder;
use super::segmenter::{DEFAULT_MAX_SEGMENT_CHARS, SentenceSegmenter};
use super::transport::ChatTransport;
use crate::config::RelayConfig;
use crate::relay::event::OutboundEvent;
use crate::relay::multiplexer::ChatTurnRequest;

const INCOMPLETE_STREAM: &str = "the response ended before it was complete";

/// Per-session request options.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Model requested for every turn.
    pub model_id: String,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// Let the relay offer tools.
    pub use_tools: bool,
    /// Longest span handed to speech synthesis.
    pub max_segment_chars: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            system_prompt: None,
            use_tools: true,
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
        }
    }
}

impl SessionSettings {
    /// Settings from the `[client]` and `[speech]` config sections.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            model_id: config.client.model_id.clone(),
            system_prompt: config.client.system_prompt.clone(),
            use_tools: config.client.use_tools,
            max_segment_chars: config.speech.max_segment_chars,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    conversation: Conversation,
    generation: u64,
    /// Cancels the running turn.
    active: Option<CancellationToken>,
}

struct SessionInner {
    transport: Arc<dyn ChatTransport>,
    queue: Option<AudioQueue>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<Conversation>,
    turn_active: watch::Sender<bool>,
}

/// Single-flow chat session.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("settings", &self.inner.settings)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a session with an empty conversation.
    ///
    /// Without a queue nothing is spoken.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        queue: Option<AudioQueue>,
        settings: SessionSettings,
    ) -> Self {
        let conversation = Conversation::new();
        let (snapshots, _) = watch::channel(conversation.clone());
        let (turn_active, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                transport,
                queue,
                settings,
                state: Mutex::new(SessionState {
                    conversation,
                    generation: 0,
                    active: None,
                }),
                snapshots,
                turn_active,
            }),
        }
    }

    /// Send `text` as a new user message and stream the reply.
    ///
    /// Aborts a running turn first. Blank text is ignored and returns
    /// `false`. Must be called from within a Tokio runtime.
    pub fn submit(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.abort();
        let mut state = self.inner.state();
        state.conversation = append_turn(state.conversation.clone(), text, Vec::new());
        self.start_turn(&mut state);
        true
    }

    /// Replace the message with `id` and everything after it with a new
    /// reply. Returns `false` if the message is unknown or is the first one.
    pub fn regenerate(&self, id: &str) -> bool {
        self.abort();
        let mut state = self.inner.state();
        let Some(next) = regenerate_from(&state.conversation, id) else {
            return false;
        };
        state.conversation = next;
        self.start_turn(&mut state);
        true
    }

    /// Regenerate the most recent assistant reply.
    pub fn regenerate_last(&self) -> bool {
        let id = self
            .inner
            .state()
            .conversation
            .last_assistant_id()
            .map(str::to_owned);
        id.is_some_and(|id| self.regenerate(&id))
    }

    /// Rewrite the message with `id`, drop everything after it, and stream a
    /// new reply. Returns `false` if the message is unknown.
    pub fn edit(&self, id: &str, content: &str) -> bool {
        self.abort();
        let mut state = self.inner.state();
        let Some(next) = edit_and_truncate(&state.conversation, id, content) else {
            return false;
        };
        state.conversation = next;
        self.start_turn(&mut state);
        true
    }

    /// Remove the message with `id` and everything after it.
    pub fn delete(&self, id: &str) -> bool {
        self.abort();
        let mut state = self.inner.state();
        let Some(next) = truncate_from(&state.conversation, id) else {
            return false;
        };
        state.conversation = next;
        self.inner.publish(&state);
        true
    }

    /// Stop the running turn and all speech.
    ///
    /// The in-progress reply is finalized as interrupted with its status
    /// text kept. Safe to call when idle.
    pub fn abort(&self) {
        let mut state = self.inner.state();
        if let Some(token) = state.active.take() {
            token.cancel();
            state.generation += 1;
            state.conversation = mark_interrupted(state.conversation.clone());
            info!(generation = state.generation, "turn aborted");
            self.inner.publish(&state);
            self.inner.turn_active.send_replace(false);
        }
        self.inner.silence();
    }

    /// Current conversation.
    pub fn snapshot(&self) -> Conversation {
        self.inner.state().conversation.clone()
    }

    /// Receiver of every published conversation snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Conversation> {
        self.inner.snapshots.subscribe()
    }

    /// Whether a turn is streaming.
    pub fn is_active(&self) -> bool {
        *self.inner.turn_active.borrow()
    }

    /// Wait until the running turn has finished and all speech has played.
    pub async fn wait_idle(&self) {
        let mut active = self.inner.turn_active.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = active.wait_for(|active| !*active).await;
        if let Some(queue) = &self.inner.queue {
            queue.wait_idle().await;
        }
    }

    fn start_turn(&self, state: &mut SessionState) {
        let request = ChatTurnRequest {
            messages: state.conversation.request_history(),
            system_prompt: self.inner.settings.system_prompt.clone(),
            model_id: self.inner.settings.model_id.clone(),
            use_tools: self.inner.settings.use_tools,
        };
        let token = CancellationToken::new();
        state.generation += 1;
        state.active = Some(token.clone());
        self.inner.publish(state);
        self.inner.turn_active.send_replace(true);

        debug!(
            generation = state.generation,
            messages = request.messages.len(),
            "starting turn"
        );
        tokio::spawn(run_turn(
            Arc::clone(&self.inner),
            state.generation,
            request,
            token,
        ));
    }
}

impl SessionInner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.conversation.clone());
    }

    /// Apply decoded events if `generation` is still current.
    ///
    /// Returns `false` once the turn is stale.
    fn apply(
        &self,
        generation: u64,
        events: &[OutboundEvent],
        segmenter: &mut SentenceSegmenter,
    ) -> bool {
        let mut state = self.state();
        if state.generation != generation {
            return false;
        }
        if events.is_empty() {
            return true;
        }
        for event in events {
            state.conversation = apply_event(state.conversation.clone(), event);
            match event {
                OutboundEvent::Content { text } => self.speak(segmenter.push(text)),
                OutboundEvent::Done => self.speak(segmenter.flush()),
                OutboundEvent::Error { .. } => {
                    // The partial answer is replaced by the error text.
                    segmenter.clear();
                    self.silence();
                }
                OutboundEvent::Status { .. } => {}
            }
        }
        self.publish(&state);
        true
    }

    fn speak(&self, segments: Vec<String>) {
        let Some(queue) = &self.queue else {
            return;
        };
        for segment in segments {
            queue.enqueue(segment);
        }
    }

    fn silence(&self) {
        if let Some(queue) = &self.queue {
            queue.cancel_all();
        }
    }

    /// End the turn, applying `finalize` if `generation` is still current.
    fn finish(&self, generation: u64, finalize: impl FnOnce(Conversation) -> Conversation) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        state.conversation = finalize(state.conversation.clone());
        state.active = None;
        self.publish(&state);
        self.turn_active.send_replace(false);
    }
}

async fn run_turn(
    inner: Arc<SessionInner>,
    generation: u64,
    request: ChatTurnRequest,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = inner.transport.open(&request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "turn failed to start");
            let message = e.to_string();
            inner.finish(generation, |conv| mark_failed(conv, &message));
            return;
        }
    };

    let mut decoder = StreamDecoder::new();
    let mut segmenter = SentenceSegmenter::new(inner.settings.max_segment_chars);
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, "decode loop stopped");
                return;
            }
            chunk = stream.next() => chunk,
        };
        let events = match chunk {
            Some(Ok(bytes)) => decoder.feed(&bytes),
            Some(Err(e)) => {
                warn!(error = %e, "turn stream failed");
                let message = e.to_string();
                inner.finish(generation, |conv| mark_failed(conv, &message));
                return;
            }
            None => {
                let events = decoder.finish();
                if !inner.apply(generation, &events, &mut segmenter) {
                    return;
                }
                break;
            }
        };
        if !inner.apply(generation, &events, &mut segmenter) {
            return;
        }
        if decoder.is_finished() {
            break;
        }
    }

    // A stream that ends without a done leaves the reply streaming.
    inner.finish(generation, |conv| mark_failed(conv, INCOMPLETE_STREAM));
}
