//! Request and latency metrics.
//!
//! A pure numeric aggregate — no locking, no clock. The manager owns one
//! instance inside its state lock and feeds it samples; `snapshot` produces
//! the wire shape for the status surface.

use tokio::time::Duration;

use talekit_core::MetricsSnapshot;

/// Aggregates counts and an incremental-mean response latency.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_requests: u64,
    successful_requests: u64,
    average_response_time_ms: f64,
    queued_requests: u64,
}

impl MetricsCollector {
    /// Count one `speak` call (successful or not).
    pub const fn record_request(&mut self) {
        self.total_requests += 1;
    }

    /// Count one playback start and fold its latency into the running mean:
    /// `avg' = avg + (sample − avg) / n`.
    pub fn record_success(&mut self, response_time: Duration) {
        self.successful_requests += 1;
        let sample = response_time.as_secs_f64() * 1000.0;
        #[allow(clippy::cast_precision_loss)]
        let n = self.successful_requests as f64;
        self.average_response_time_ms += (sample - self.average_response_time_ms) / n;
    }

    /// Bump the live backlog gauge.
    pub const fn record_enqueued(&mut self) {
        self.queued_requests += 1;
    }

    /// Drop the live backlog gauge (dequeue or discard).
    pub const fn record_dequeued(&mut self) {
        self.queued_requests = self.queued_requests.saturating_sub(1);
    }

    /// Current backlog gauge value.
    #[must_use]
    pub const fn queued_requests(&self) -> u64 {
        self.queued_requests
    }

    /// Copy out the wire shape.
    #[must_use]
    pub const fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            average_response_time_ms: self.average_response_time_ms,
            queued_requests: self.queued_requests,
        }
    }
}
