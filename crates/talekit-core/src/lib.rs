//! Core domain types and port definitions for talekit.
//!
//! This crate holds the pure, infrastructure-free surface shared by the
//! narration engine and its hosts: runtime-tunable [`AudioSettings`], the
//! status/metrics wire shapes, and the [`PlaybackSink`] port that abstracts
//! over the concrete audio output device (browser audio element, rodio
//! sink, test double, ...).
//!
//! No I/O happens here. Implementations of the ports live in the host or
//! in `talekit-voice`'s test doubles.

pub mod ports;
pub mod settings;
pub mod status;

// Re-export commonly used types for convenience
pub use ports::{PlaybackSink, PlaybackVoice, SinkError};
pub use settings::{AudioSettings, AudioSettingsPatch};
pub use status::{MetricsSnapshot, NarrationStatus};
