//! Narration engine error types.
//!
//! One flat taxonomy for everything that can go wrong between a `speak`
//! call and audible playback. The engine never lets these escape as panics;
//! callers that don't care can use the fire-and-forget wrapper and the
//! error is logged instead.

/// Errors that can occur in the narration pipeline.
#[derive(Debug, thiserror::Error)]
pub enum NarrateError {
    /// The request itself was malformed (empty text).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The service rejected a request parameter (voice, format, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The synthesis client is uninitialized or disabled.
    #[error("synthesis client not ready")]
    ClientUnavailable,

    /// The circuit breaker is open; no network attempt was made.
    #[error("circuit breaker open — synthesis temporarily disabled")]
    CircuitOpen,

    /// The remote call exceeded the per-request deadline.
    #[error("synthesis request timed out")]
    Timeout,

    /// The service rejected our credentials. Disables the client until a
    /// fresh `initialize`.
    #[error("synthesis credentials rejected: {0}")]
    Credentials(String),

    /// Transport-level failure reaching the service.
    #[error("synthesis network error: {0}")]
    Network(String),

    /// The service throttled us.
    #[error("rate limited by synthesis service")]
    RateLimited,

    /// The service reported a server-side failure.
    #[error("synthesis service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The response stream was malformed, unterminated, or empty.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// The playback device failed to start the decoded audio (anything
    /// other than an autoplay-policy rejection, which is recovered from
    /// instead).
    #[error("playback failed: {0}")]
    Playback(String),

    /// The request was discarded by `stop_all` before completing.
    #[error("narration cancelled")]
    Cancelled,

    /// Anything the classifier could not identify.
    #[error("unexpected synthesis failure: {0}")]
    Unknown(String),
}

impl NarrateError {
    /// Whether this failure counts toward the circuit breaker.
    ///
    /// Client-side validation, gate refusals, stream/playback faults, and
    /// cancellation say nothing about the health of the remote service and
    /// are excluded.
    #[must_use]
    pub const fn counts_toward_breaker(&self) -> bool {
        match self {
            Self::Timeout
            | Self::Credentials(_)
            | Self::Network(_)
            | Self::RateLimited
            | Self::ServiceUnavailable(_)
            | Self::Unknown(_) => true,

            Self::InvalidInput(_)
            | Self::InvalidParameter(_)
            | Self::ClientUnavailable
            | Self::CircuitOpen
            | Self::Stream(_)
            | Self::Playback(_)
            | Self::Cancelled => false,
        }
    }
}
