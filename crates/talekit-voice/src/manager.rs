//! Narration manager — orchestrates synthesis, admission, queueing,
//! breaker, recovery, and metrics behind one caller-facing facade.
//!
//! All shared state lives in a single [`ManagerState`] behind one
//! `tokio::sync::Mutex`; the admission check and any eviction run under
//! one lock hold, so they form one indivisible step. Network calls, stream
//! reads, device starts, and pacing sleeps all happen outside the lock.
//!
//! A `speak` call flows:
//!
//! ```text
//!   validate/truncate → client gate → breaker gate → capacity check
//!        │                                              │
//!        │                              full: enqueue (FIFO, paced drain)
//!        └── admit: synthesize (10 s cap) → assemble → start playback
//!                                        └─ blocked: gesture recovery
//! ```
//!
//! Failures never escape as panics; they resolve into the
//! [`NarrateError`] taxonomy, and the fire-and-forget [`narrate`] wrapper
//! reduces them to log lines so the game loop is never disturbed.
//!
//! [`narrate`]: NarrationManager::narrate

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

use talekit_core::{
    AudioSettings, AudioSettingsPatch, NarrationStatus, PlaybackSink, PlaybackVoice, SinkError,
};

use crate::autoplay::{GESTURE_TIMEOUT, GestureGate, GestureWait, Recovery};
use crate::breaker::CircuitBreaker;
use crate::client::{
    SYNTHESIS_TIMEOUT, SynthesisBackend, SynthesisClient, SynthesisConfig, SynthesisRequest,
};
use crate::error::NarrateError;
use crate::metrics::MetricsCollector;
use crate::playback::{ResourceArena, ResourceId, ResourceState};
use crate::queue::{Backlog, QueueCompletion};

/// How a `speak` call resolved.
#[derive(Debug)]
pub enum SpeakOutcome {
    /// Playback has started.
    Started,

    /// The active set was full; the request waits in the backlog. The
    /// receiver resolves with the eventual drain outcome.
    Queued(QueueCompletion),

    /// Playback was blocked by autoplay policy; the resource is parked
    /// until the next user gesture (or 30 s).
    AwaitingGesture,
}

/// Everything mutated by the narration pipeline, guarded by one lock.
struct ManagerState {
    client: SynthesisClient,
    breaker: CircuitBreaker,
    arena: ResourceArena,
    backlog: Backlog,
    drain_running: bool,
    settings: AudioSettings,
    metrics: MetricsCollector,
    cancel: CancellationToken,
}

struct ManagerInner {
    state: Mutex<ManagerState>,
    sink: Arc<dyn PlaybackSink>,
    gesture: GestureGate,
}

/// The narration engine facade.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct NarrationManager {
    inner: Arc<ManagerInner>,
}

impl NarrationManager {
    /// Manager with default settings over the given playback device.
    #[must_use]
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        Self::with_settings(sink, AudioSettings::default())
    }

    /// Manager with explicit settings (clamped on entry).
    #[must_use]
    pub fn with_settings(sink: Arc<dyn PlaybackSink>, settings: AudioSettings) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ManagerState {
                    client: SynthesisClient::new(),
                    breaker: CircuitBreaker::new(),
                    arena: ResourceArena::new(),
                    backlog: Backlog::new(),
                    drain_running: false,
                    settings: settings.clamped(),
                    metrics: MetricsCollector::default(),
                    cancel: CancellationToken::new(),
                }),
                sink,
                gesture: GestureGate::new(),
            }),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Configure the synthesis client. Returns whether it became ready;
    /// invalid configuration logs and leaves narration disabled instead
    /// of failing.
    pub async fn initialize(&self, config: SynthesisConfig) -> bool {
        let mut st = self.inner.state.lock().await;
        st.client.initialize(config);
        st.client.is_ready()
    }

    /// Configure the client with an explicit backend (tests, alternative
    /// transports).
    pub async fn initialize_with_backend(
        &self,
        config: SynthesisConfig,
        backend: Arc<dyn SynthesisBackend>,
    ) -> bool {
        let mut st = self.inner.state.lock().await;
        st.client.initialize_with_backend(config, backend);
        st.client.is_ready()
    }

    /// Stop everything and drop the client configuration.
    pub async fn dispose(&self) {
        self.stop_all().await;
        let mut st = self.inner.state.lock().await;
        st.client.dispose();
        tracing::info!("Narration manager disposed");
    }

    // ── Speak pipeline ─────────────────────────────────────────────

    /// Request narration of `text`.
    ///
    /// Resolves once playback has started, the request was queued, or the
    /// resource entered gesture recovery. Errors are the classified
    /// taxonomy and are safe to ignore.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome, NarrateError> {
        let started_at = Instant::now();

        let (id, request, backend, cancel) = {
            let mut st = self.inner.state.lock().await;
            st.metrics.record_request();

            let prepared = match st.client.prepare_text(text) {
                Ok(prepared) => prepared,
                Err(e) => {
                    tracing::debug!(error = %e, "Narration request rejected");
                    return Err(e);
                }
            };
            if !st.client.is_ready() {
                tracing::debug!("Narration skipped — synthesis client not ready");
                return Err(NarrateError::ClientUnavailable);
            }
            if let Err(e) = st.breaker.check() {
                tracing::debug!("Narration dropped — circuit breaker open");
                return Err(e);
            }

            if !st.arena.has_capacity(st.settings.max_concurrent_audio) {
                let rx = st.backlog.push(prepared);
                st.metrics.record_enqueued();
                tracing::debug!(queued = st.backlog.len(), "Active set full — request queued");
                let delay = Duration::from_millis(st.settings.queue_processing_delay_ms);
                self.schedule_drain(&mut st, delay);
                return Ok(SpeakOutcome::Queued(rx));
            }

            let request = st.client.request(prepared)?;
            let backend = st.client.backend()?;
            let default_volume = st.settings.default_volume;
            let id = st.arena.reserve(default_volume);
            (id, request, backend, st.cancel.clone())
        };

        self.run_pipeline(id, &request, backend.as_ref(), &cancel, started_at)
            .await
    }

    /// Fire-and-forget narration: failures become log lines, never
    /// results, so game code can call this from anywhere.
    pub fn narrate(&self, text: impl Into<String>) {
        let this = self.clone();
        let text = text.into();
        tokio::spawn(async move {
            if let Err(e) = this.speak(&text).await {
                tracing::warn!(error = %e, "Narration dropped");
            }
        });
    }

    /// Synthesize and play one admitted request. `id` already holds a
    /// capacity reservation.
    async fn run_pipeline(
        &self,
        id: ResourceId,
        request: &SynthesisRequest,
        backend: &dyn SynthesisBackend,
        cancel: &CancellationToken,
        started_at: Instant,
    ) -> Result<SpeakOutcome, NarrateError> {
        let synthesis = tokio::select! {
            () = cancel.cancelled() => Err(NarrateError::Cancelled),
            result = timeout(SYNTHESIS_TIMEOUT, backend.synthesize(request)) => {
                result.map_or(Err(NarrateError::Timeout), |inner| inner)
            }
        };

        let buffer = match synthesis {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                self.fail_request(id, &e).await;
                return Err(e);
            }
        };

        {
            let mut st = self.inner.state.lock().await;
            if !st.arena.contains(id) {
                // stop_all raced the synthesis call
                return Err(NarrateError::Cancelled);
            }
            st.breaker.record_success();
        }

        self.start_playback(id, buffer, started_at, cancel).await
    }

    /// Hand an assembled buffer to the playback device.
    async fn start_playback(
        &self,
        id: ResourceId,
        buffer: Bytes,
        started_at: Instant,
        cancel: &CancellationToken,
    ) -> Result<SpeakOutcome, NarrateError> {
        if !self.inner.sink.is_visible() {
            tracing::debug!(resource = id, "Page hidden — treating playback as blocked");
            return self.begin_recovery(id, buffer, started_at, cancel).await;
        }

        let Some(volume) = self.prepare_start(id).await else {
            return Err(NarrateError::Cancelled);
        };

        match self.inner.sink.start(buffer.clone(), volume).await {
            Ok(voice) => {
                let mut st = self.inner.state.lock().await;
                if !st.arena.mark_playing(id, Arc::clone(&voice)) {
                    // stop_all raced the device start; don't leak the voice
                    voice.stop();
                    return Err(NarrateError::Cancelled);
                }
                st.metrics.record_success(started_at.elapsed());
                drop(st);
                self.watch_end(id, voice);
                Ok(SpeakOutcome::Started)
            }
            Err(SinkError::NotAllowed(reason)) => {
                tracing::debug!(resource = id, %reason, "Playback blocked by autoplay policy");
                self.begin_recovery(id, buffer, started_at, cancel).await
            }
            Err(SinkError::Device(detail)) => {
                let err = NarrateError::Playback(detail);
                self.fail_request(id, &err).await;
                Err(err)
            }
        }
    }

    /// Re-check capacity (it may have shrunk mid-flight) and read the
    /// resource volume. `None` means the resource is gone.
    async fn prepare_start(&self, id: ResourceId) -> Option<f32> {
        let mut st = self.inner.state.lock().await;
        let volume = st.arena.get(id)?.volume;
        let max = st.settings.max_concurrent_audio;
        let fade = Duration::from_millis(st.settings.fade_out_duration_ms);
        st.arena.ensure_capacity(id, max, fade).await;
        Some(volume)
    }

    /// Record a failed request: breaker bookkeeping, credentials
    /// shutdown, resource release.
    async fn fail_request(&self, id: ResourceId, error: &NarrateError) {
        {
            let mut st = self.inner.state.lock().await;
            if error.counts_toward_breaker() {
                st.breaker.record_failure();
            }
            if matches!(error, NarrateError::Credentials(_)) {
                st.client.disable();
            }
            st.arena.release(id, ResourceState::Errored);
            tracing::warn!(resource = id, error = %error, "Narration request failed");
        }
        self.kick_drain().await;
    }

    /// Spawn the watcher that releases a resource when its audio drains
    /// naturally and then lets queued work claim the freed slot.
    fn watch_end(&self, id: ResourceId, voice: Arc<dyn PlaybackVoice>) {
        let this = self.clone();
        tokio::spawn(async move {
            voice.wait_until_end().await;
            let released = {
                let mut st = this.inner.state.lock().await;
                st.arena.release(id, ResourceState::Ended)
            };
            if released {
                this.kick_drain().await;
            }
        });
    }

    // ── Autoplay recovery ──────────────────────────────────────────

    /// Park a policy-blocked resource and spawn its recovery task.
    async fn begin_recovery(
        &self,
        id: ResourceId,
        buffer: Bytes,
        started_at: Instant,
        cancel: &CancellationToken,
    ) -> Result<SpeakOutcome, NarrateError> {
        {
            let mut st = self.inner.state.lock().await;
            if !st.arena.mark_blocked(id, buffer) {
                return Err(NarrateError::Cancelled);
            }
        }
        // The blocked resource left the active set — queued work may run.
        self.kick_drain().await;

        let this = self.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            this.recovery_task(id, started_at, &cancel).await;
        });
        Ok(SpeakOutcome::AwaitingGesture)
    }

    /// Wait for a gesture (or expiry) and retry playback once.
    async fn recovery_task(&self, id: ResourceId, started_at: Instant, cancel: &CancellationToken) {
        let mut recovery = Recovery::new();
        recovery.arm();
        tracing::debug!(resource = id, "Waiting for user gesture to retry narration");

        match self.inner.gesture.wait(GESTURE_TIMEOUT, cancel).await {
            GestureWait::Gesture => {
                recovery.gesture();
                self.retry_blocked(id, started_at).await;
            }
            GestureWait::TimedOut => {
                recovery.expire();
                tracing::debug!(resource = id, "Gesture window expired — releasing narration");
                let mut st = self.inner.state.lock().await;
                st.arena.release(id, ResourceState::Errored);
            }
            GestureWait::Cancelled => {
                // stop_all already released the resource
            }
        }
    }

    /// The single post-gesture retry.
    async fn retry_blocked(&self, id: ResourceId, started_at: Instant) {
        let Some((buffer, volume)) = ({
            let mut st = self.inner.state.lock().await;
            match st.arena.reclaim_blocked(id) {
                Some(buffer) => {
                    let volume = st.arena.get(id).map_or(0.0, |r| r.volume);
                    let max = st.settings.max_concurrent_audio;
                    let fade = Duration::from_millis(st.settings.fade_out_duration_ms);
                    st.arena.ensure_capacity(id, max, fade).await;
                    Some((buffer, volume))
                }
                None => None,
            }
        }) else {
            return;
        };

        match self.inner.sink.start(buffer, volume).await {
            Ok(voice) => {
                let mut st = self.inner.state.lock().await;
                if st.arena.mark_playing(id, Arc::clone(&voice)) {
                    st.metrics.record_success(started_at.elapsed());
                    drop(st);
                    self.watch_end(id, voice);
                    tracing::debug!(resource = id, "Narration recovered after user gesture");
                } else {
                    voice.stop();
                }
            }
            Err(e) => {
                tracing::warn!(resource = id, error = %e, "Gesture retry failed — releasing");
                let mut st = self.inner.state.lock().await;
                st.arena.release(id, ResourceState::Errored);
            }
        }
    }

    /// Report a user gesture (pointer, key, or touch activation). Wakes
    /// every resource waiting in autoplay recovery.
    pub fn user_gesture(&self) {
        self.inner.gesture.signal();
    }

    // ── Queue drain ────────────────────────────────────────────────

    /// Start the drain loop unless one is already running or there is
    /// nothing to drain. Caller holds the state lock.
    fn schedule_drain(&self, st: &mut ManagerState, initial_delay: Duration) {
        if st.drain_running || st.backlog.is_empty() {
            return;
        }
        st.drain_running = true;
        let this = self.clone();
        let cancel = st.cancel.clone();
        tokio::spawn(async move {
            this.drain_loop(initial_delay, cancel).await;
        });
    }

    /// Schedule a drain after capacity was freed.
    async fn kick_drain(&self) {
        let mut st = self.inner.state.lock().await;
        let delay = Duration::from_millis(st.settings.queue_processing_delay_ms);
        self.schedule_drain(&mut st, delay);
    }

    /// The mutually exclusive drain loop: pop-and-process while capacity
    /// is free, pacing between items; when capacity stays full, retry
    /// after twice the pacing delay.
    async fn drain_loop(self, initial_delay: Duration, cancel: CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = sleep(initial_delay) => {}
        }

        loop {
            let (entry, id, request, backend, pacing) = {
                let mut st = self.inner.state.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                let pacing = Duration::from_millis(st.settings.queue_processing_delay_ms);

                if st.backlog.is_empty() {
                    st.drain_running = false;
                    return;
                }
                if !st.arena.has_capacity(st.settings.max_concurrent_audio) {
                    drop(st);
                    // capacity still full — we are our own reschedule
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = sleep(pacing * 2) => {}
                    }
                    continue;
                }

                let Some(entry) = st.backlog.pop() else {
                    st.drain_running = false;
                    return;
                };
                st.metrics.record_dequeued();

                // same gates as a direct call
                if !st.client.is_ready() {
                    entry.complete(Err(NarrateError::ClientUnavailable));
                    drop(st);
                    self.pace(pacing, &cancel).await;
                    continue;
                }
                if let Err(e) = st.breaker.check() {
                    entry.complete(Err(e));
                    drop(st);
                    self.pace(pacing, &cancel).await;
                    continue;
                }

                let request = match st.client.request(entry.text.clone()) {
                    Ok(request) => request,
                    Err(e) => {
                        entry.complete(Err(e));
                        drop(st);
                        self.pace(pacing, &cancel).await;
                        continue;
                    }
                };
                let Ok(backend) = st.client.backend() else {
                    entry.complete(Err(NarrateError::ClientUnavailable));
                    drop(st);
                    self.pace(pacing, &cancel).await;
                    continue;
                };
                let default_volume = st.settings.default_volume;
                let id = st.arena.reserve(default_volume);
                (entry, id, request, backend, pacing)
            };

            let enqueued_at = entry.enqueued_at;
            let result = self
                .run_pipeline(id, &request, backend.as_ref(), &cancel, enqueued_at)
                .await;
            entry.complete(result.map(|_| ()));

            self.pace(pacing, &cancel).await;
            if cancel.is_cancelled() {
                return;
            }
        }
    }

    /// Inter-item pacing so drains don't burst the remote service.
    async fn pace(&self, pacing: Duration, cancel: &CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = sleep(pacing) => {}
        }
    }

    // ── Control surface ────────────────────────────────────────────

    /// Stop and release every active resource, discard the backlog, and
    /// cancel in-flight work. Idempotent.
    pub async fn stop_all(&self) {
        let mut st = self.inner.state.lock().await;
        let stopped = st.arena.release_all();
        let discarded = st.backlog.drain_all();
        let discarded_count = discarded.len();
        for entry in discarded {
            st.metrics.record_dequeued();
            entry.complete(Err(NarrateError::Cancelled));
        }
        st.drain_running = false;
        st.cancel.cancel();
        st.cancel = CancellationToken::new();
        if stopped > 0 || discarded_count > 0 {
            tracing::info!(stopped, discarded = discarded_count, "Stopped all narration");
        }
    }

    /// Clear the circuit breaker (operator override). A client disabled
    /// by a credentials failure still needs a fresh `initialize`.
    pub async fn reset_errors(&self) {
        let mut st = self.inner.state.lock().await;
        st.breaker.reset();
    }

    /// Apply a partial settings update (clamped).
    pub async fn configure(&self, patch: AudioSettingsPatch) {
        let mut st = self.inner.state.lock().await;
        st.settings.apply(patch);
        tracing::info!(settings = ?st.settings, "Audio settings updated");
    }

    /// Set the global volume: the default for new resources and the live
    /// volume of everything currently playing.
    pub async fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            return;
        };
        let mut st = self.inner.state.lock().await;
        st.settings.default_volume = volume;
        st.arena.set_volume_all(volume);
    }

    /// Snapshot for the host's status surface.
    pub async fn status(&self) -> NarrationStatus {
        let st = self.inner.state.lock().await;
        NarrationStatus {
            client_ready: st.client.is_ready(),
            error_count: st.breaker.failure_count(),
            disabled_until_reset: st.client.is_disabled(),
            settings: st.settings,
            metrics: st.metrics.snapshot(),
        }
    }

    /// Number of resources currently holding a capacity slot.
    pub async fn active_narrations(&self) -> usize {
        self.inner.state.lock().await.arena.active_len()
    }

    /// Whether any narration is currently audible or starting.
    pub async fn is_speaking(&self) -> bool {
        self.active_narrations().await > 0
    }
}
