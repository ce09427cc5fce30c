//! Narration engine: remote text-to-speech with bounded concurrent
//! playback, FIFO queueing, a circuit breaker, and autoplay recovery.
//!
//! The entry point is [`NarrationManager`]; hosts provide a
//! [`PlaybackSink`](talekit_core::PlaybackSink) for the audio device and
//! configure a [`SynthesisConfig`] for the remote service.

pub mod autoplay;
pub mod breaker;
pub mod client;
pub mod effects;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod playback;
pub mod queue;
pub mod stream;

// Re-export key types for convenience
pub use client::{SynthesisBackend, SynthesisClient, SynthesisConfig, SynthesisRequest};
pub use error::NarrateError;
pub use manager::{NarrationManager, SpeakOutcome};
pub use playback::{ResourceArena, ResourceId, ResourceState};
