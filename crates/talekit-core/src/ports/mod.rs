//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the narration engine expects from its host.
//! They contain no implementation details and use only domain types.

pub mod playback;

pub use playback::{PlaybackSink, PlaybackVoice, SinkError};
