//! Chat client: decodes the relay's event stream, keeps the conversation,
//! and speaks the reply.
//!
//! # Submodules
//!
//! - [`decoder`]: incremental event-stream decoder
//! - [`conversation`]: conversation model and pure reducers
//! - [`segmenter`]: sentence segmentation for speech
//! - [`speech`]: speech synthesis collaborator
//! - [`playback`]: audio sinks
//! - [`audio_queue`]: ordered, cancellable playback queue
//! - [`transport`]: HTTP transport to the relay endpoint
//! - [`session`]: single-flow turn driver with abort

pub mod audio_queue;
pub mod conversation;
pub mod decoder;
pub mod playback;
pub mod segmenter;
pub mod session;
pub mod speech;
pub mod transport;

pub use audio_queue::{AudioQueue, AudioTask};
pub use conversation::{ChatMessage, Conversation, MessageState};
pub use decoder::StreamDecoder;
pub use playback::{AudioSink, CommandSink, NullSink};
pub use segmenter::SentenceSegmenter;
pub use session::{ChatSession, SessionSettings};
pub use speech::{HttpSpeechClient, SpeechSynthesizer};
pub use transport::{ChatTransport, HttpTransport, ResponseStream};
