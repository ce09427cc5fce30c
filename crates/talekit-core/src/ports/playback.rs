//! Playback device port — trait abstraction for the audio output device.
//!
//! The engine never talks to a concrete device. It hands an encoded audio
//! buffer to a [`PlaybackSink`] and controls the resulting [`PlaybackVoice`]
//! for the rest of that resource's life. Hosts implement these traits over
//! whatever backend they have (a browser audio element, a rodio sink, a
//! test double).
//!
//! # Design Rules
//!
//! - No engine types in any signature; buffers are opaque encoded bytes.
//! - `start` resolves only once playback has actually begun, so the engine
//!   can time response latency and detect autoplay-policy rejection at the
//!   one point where the device reports it.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Errors a playback device can report when starting a voice.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The device refused to start because no user gesture has activated
    /// audio yet (browser autoplay policy and friends). The engine routes
    /// these into gesture recovery instead of failing the request.
    #[error("playback not allowed by autoplay policy: {0}")]
    NotAllowed(String),

    /// Any other device-side failure (decode error, device lost, ...).
    #[error("playback device error: {0}")]
    Device(String),
}

/// An audio output device that can play encoded buffers.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Decode `buffer` and start playing it at `volume` (0.0–1.0).
    ///
    /// Resolves with a [`PlaybackVoice`] once audio is audible. Rejects
    /// with [`SinkError::NotAllowed`] when blocked by autoplay policy.
    async fn start(&self, buffer: Bytes, volume: f32) -> Result<Arc<dyn PlaybackVoice>, SinkError>;

    /// Whether the hosting page/window is currently visible.
    ///
    /// A hidden page is treated as pre-emptively blocked: the engine skips
    /// the start attempt and goes straight to gesture recovery.
    fn is_visible(&self) -> bool {
        true
    }
}

/// A single playing (or played) audio stream handed out by a sink.
#[async_trait]
pub trait PlaybackVoice: Send + Sync {
    /// Adjust the live volume (0.0–1.0). Used by the eviction fade ramp
    /// and the global volume setter.
    fn set_volume(&self, volume: f32);

    /// Stop playback immediately. Must be safe to call more than once and
    /// after natural completion.
    fn stop(&self);

    /// Complete when the audio finishes naturally or is stopped.
    async fn wait_until_end(&self);
}
