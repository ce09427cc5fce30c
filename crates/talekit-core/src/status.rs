//! Status and metrics wire shapes.
//!
//! Transport-agnostic DTOs returned by the engine's status surface. Hosts
//! serialize these directly (camelCase) for debug overlays or telemetry.

use serde::{Deserialize, Serialize};

use crate::settings::AudioSettings;

/// Aggregated request/latency counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Total `speak` calls observed, including rejected ones.
    pub total_requests: u64,

    /// Requests whose playback actually started.
    pub successful_requests: u64,

    /// Incremental mean of request-to-playback latency, in milliseconds.
    pub average_response_time_ms: f64,

    /// Live gauge of requests currently waiting in the backlog.
    pub queued_requests: u64,
}

/// Snapshot of the narration engine for the host's status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationStatus {
    /// Whether the synthesis client is initialized and usable.
    pub client_ready: bool,

    /// Current consecutive-failure count feeding the circuit breaker.
    pub error_count: u32,

    /// True when a credentials failure disabled the client; only a fresh
    /// `initialize` clears this.
    pub disabled_until_reset: bool,

    /// Effective (clamped) settings.
    pub settings: AudioSettings,

    /// Request/latency counters.
    pub metrics: MetricsSnapshot,
}
