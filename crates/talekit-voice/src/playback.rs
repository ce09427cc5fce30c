//! Playback resource arena and admission control.
//!
//! Every admitted request becomes a [`PlaybackResource`] in an id-indexed
//! arena. The arena is the single authority over resource lifetime: all
//! terminal transitions go through [`ResourceArena::release`], which takes
//! the entry out of the map, so the underlying device voice is stopped and
//! released exactly once no matter how many paths race toward it.
//!
//! Admission is bounded: `Pending`, `Playing`, and `Fading` resources
//! count toward `max_concurrent_audio`; resources parked in autoplay
//! recovery (`Blocked`) do not. When capacity must be reclaimed, the
//! chronologically oldest counted resource is faded out in fixed steps and
//! then released. The manager drives the arena under one state lock, so
//! the eviction-then-admit sequence is indivisible.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::{Duration, Instant, sleep};

use talekit_core::PlaybackVoice;

/// Number of fixed volume steps in the eviction fade ramp.
pub const FADE_STEPS: u32 = 20;

/// Identifier of a playback resource. Allocation order doubles as age
/// order.
pub type ResourceId = u64;

/// Lifecycle of one playback resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Admitted; synthesis or playback start still in flight. Counts
    /// toward capacity.
    Pending,

    /// Parked in autoplay recovery waiting for a user gesture. Retained
    /// but outside the active set.
    Blocked,

    /// Audible. Counts toward capacity.
    Playing,

    /// Being faded out by an eviction. Counts toward capacity.
    Fading,

    /// Terminal: finished or stopped.
    Ended,

    /// Terminal: failed or expired.
    Errored,
}

/// One narration playback resource.
pub struct PlaybackResource {
    /// Arena id.
    pub id: ResourceId,

    /// Current lifecycle state.
    pub state: ResourceState,

    /// Volume this resource plays at.
    pub volume: f32,

    /// Admission time, kept for diagnostics; age ordering uses ids.
    pub created_at: Instant,

    /// Encoded payload, retained while a start attempt may still need it
    /// (pending synthesis hands it over; autoplay recovery reuses it).
    pub buffer: Option<Bytes>,

    /// Device voice, present once playback started.
    pub voice: Option<Arc<dyn PlaybackVoice>>,
}

/// Id-indexed arena of playback resources with bounded admission.
#[derive(Default)]
pub struct ResourceArena {
    resources: BTreeMap<ResourceId, PlaybackResource>,
    next_id: ResourceId,
}

impl ResourceArena {
    /// Empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Number of resources counting toward `max_concurrent_audio`.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.resources
            .values()
            .filter(|r| counts_toward_capacity(r.state))
            .count()
    }

    /// Whether another admission fits under `max_concurrent`.
    #[must_use]
    pub fn has_capacity(&self, max_concurrent: u8) -> bool {
        self.active_len() < max_concurrent as usize
    }

    /// Reserve a slot for a new request. The caller has already checked
    /// capacity (or will call [`ensure_capacity`](Self::ensure_capacity)
    /// before starting playback).
    pub fn reserve(&mut self, volume: f32) -> ResourceId {
        let id = self.next_id;
        self.next_id += 1;
        self.resources.insert(
            id,
            PlaybackResource {
                id,
                state: ResourceState::Pending,
                volume,
                created_at: Instant::now(),
                buffer: None,
                voice: None,
            },
        );
        tracing::debug!(resource = id, "Playback slot reserved");
        id
    }

    /// Look up a resource.
    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<&PlaybackResource> {
        self.resources.get(&id)
    }

    /// Whether `id` is still alive in the arena.
    #[must_use]
    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    /// Evict oldest resources until `id` fits under `max_concurrent`.
    ///
    /// Each victim is faded to zero over `fade_duration` in
    /// [`FADE_STEPS`] fixed steps, stopped, and released. Runs under the
    /// manager's state lock, so no admission can interleave mid-eviction
    /// and no two evictions can pick the same victim.
    pub async fn ensure_capacity(
        &mut self,
        id: ResourceId,
        max_concurrent: u8,
        fade_duration: Duration,
    ) {
        loop {
            let occupied = self
                .resources
                .values()
                .filter(|r| r.id != id && counts_toward_capacity(r.state))
                .count();
            if occupied < max_concurrent as usize {
                return;
            }

            // BTreeMap iterates in id order, so the first counted entry is
            // the chronologically oldest.
            let Some(victim) = self
                .resources
                .values()
                .find(|r| r.id != id && counts_toward_capacity(r.state))
                .map(|r| r.id)
            else {
                return;
            };
            self.evict(victim, fade_duration).await;
        }
    }

    /// Fade out and release one resource.
    async fn evict(&mut self, id: ResourceId, fade_duration: Duration) {
        let (volume, voice) = match self.resources.get_mut(&id) {
            Some(resource) => {
                resource.state = ResourceState::Fading;
                (resource.volume, resource.voice.clone())
            }
            None => return,
        };

        tracing::debug!(
            resource = id,
            fade_ms = fade_duration.as_millis() as u64,
            "Evicting oldest active narration"
        );

        if let Some(voice) = voice {
            if !fade_duration.is_zero() {
                let step = fade_duration / FADE_STEPS;
                for remaining in (0..FADE_STEPS).rev() {
                    #[allow(clippy::cast_precision_loss)]
                    voice.set_volume(volume * remaining as f32 / FADE_STEPS as f32);
                    sleep(step).await;
                }
            }
        }

        self.release(id, ResourceState::Ended);
    }

    /// Attach the device voice and mark the resource audible.
    pub fn mark_playing(&mut self, id: ResourceId, voice: Arc<dyn PlaybackVoice>) -> bool {
        match self.resources.get_mut(&id) {
            Some(resource) => {
                resource.state = ResourceState::Playing;
                resource.voice = Some(voice);
                resource.buffer = None;
                true
            }
            None => false,
        }
    }

    /// Park the resource for autoplay recovery, retaining its payload.
    /// Blocked resources stop counting toward capacity.
    pub fn mark_blocked(&mut self, id: ResourceId, buffer: Bytes) -> bool {
        match self.resources.get_mut(&id) {
            Some(resource) => {
                resource.state = ResourceState::Blocked;
                resource.buffer = Some(buffer);
                true
            }
            None => false,
        }
    }

    /// Re-admit a blocked resource for a retry attempt, taking its
    /// retained payload back.
    pub fn reclaim_blocked(&mut self, id: ResourceId) -> Option<Bytes> {
        let resource = self.resources.get_mut(&id)?;
        if resource.state != ResourceState::Blocked {
            return None;
        }
        resource.state = ResourceState::Pending;
        resource.buffer.take()
    }

    /// Update the stored volume and live device volume of every
    /// non-fading resource. Fading resources keep ramp ownership of their
    /// volume.
    pub fn set_volume_all(&mut self, volume: f32) {
        for resource in self.resources.values_mut() {
            if resource.state == ResourceState::Fading {
                continue;
            }
            resource.volume = volume;
            if let Some(voice) = &resource.voice {
                voice.set_volume(volume);
            }
        }
    }

    /// The single authoritative removal path.
    ///
    /// Takes the resource out of the arena, stops its voice if one was
    /// attached, and logs the terminal transition. Returns `false` when
    /// the resource was already released — making every caller's release
    /// idempotent.
    pub fn release(&mut self, id: ResourceId, terminal: ResourceState) -> bool {
        debug_assert!(matches!(
            terminal,
            ResourceState::Ended | ResourceState::Errored
        ));
        match self.resources.remove(&id) {
            Some(resource) => {
                if let Some(voice) = resource.voice {
                    voice.stop();
                }
                tracing::debug!(resource = id, state = ?terminal, "Playback resource released");
                true
            }
            None => false,
        }
    }

    /// Release every resource (global stop). Returns how many were
    /// released.
    pub fn release_all(&mut self) -> usize {
        let ids: Vec<ResourceId> = self.resources.keys().copied().collect();
        let count = ids.len();
        for id in ids {
            self.release(id, ResourceState::Ended);
        }
        count
    }

    /// Total resources currently tracked, in any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the arena tracks nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

const fn counts_toward_capacity(state: ResourceState) -> bool {
    matches!(
        state,
        ResourceState::Pending | ResourceState::Playing | ResourceState::Fading
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeVoice {
        stops: AtomicU32,
        volumes: Mutex<Vec<f32>>,
    }

    #[async_trait]
    impl PlaybackVoice for FakeVoice {
        fn set_volume(&self, volume: f32) {
            self.volumes.try_lock().unwrap().push(volume);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        async fn wait_until_end(&self) {}
    }

    fn playing(arena: &mut ResourceArena, voice: &Arc<FakeVoice>) -> ResourceId {
        let id = arena.reserve(0.8);
        arena.mark_playing(id, Arc::clone(voice) as Arc<dyn PlaybackVoice>);
        id
    }

    #[tokio::test]
    async fn capacity_counts_pending_playing_fading() {
        let mut arena = ResourceArena::new();
        assert!(arena.has_capacity(1));

        let id = arena.reserve(0.8);
        assert!(!arena.has_capacity(1));
        assert!(arena.has_capacity(2));

        arena.mark_blocked(id, Bytes::from_static(b"payload"));
        assert!(arena.has_capacity(1), "blocked resources leave the active set");
    }

    #[tokio::test]
    async fn eviction_targets_the_oldest() {
        let mut arena = ResourceArena::new();
        let old_voice = Arc::new(FakeVoice::default());
        let young_voice = Arc::new(FakeVoice::default());
        let old = playing(&mut arena, &old_voice);
        let young = playing(&mut arena, &young_voice);

        let newcomer = arena.reserve(0.8);
        arena
            .ensure_capacity(newcomer, 2, Duration::ZERO)
            .await;

        assert!(!arena.contains(old));
        assert!(arena.contains(young));
        assert_eq!(old_voice.stops.load(Ordering::SeqCst), 1);
        assert_eq!(young_voice.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fade_ramps_volume_in_fixed_steps_then_stops() {
        let mut arena = ResourceArena::new();
        let voice = Arc::new(FakeVoice::default());
        playing(&mut arena, &voice);

        let newcomer = arena.reserve(0.8);
        arena
            .ensure_capacity(newcomer, 1, Duration::from_millis(200))
            .await;

        let volumes = voice.volumes.try_lock().unwrap().clone();
        assert_eq!(volumes.len(), FADE_STEPS as usize);
        assert!(volumes.windows(2).all(|w| w[1] <= w[0]), "ramp is monotonic");
        assert!(volumes.last().unwrap().abs() < f32::EPSILON, "ends at zero");
        assert_eq!(voice.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_is_exactly_once() {
        let mut arena = ResourceArena::new();
        let voice = Arc::new(FakeVoice::default());
        let id = playing(&mut arena, &voice);

        assert!(arena.release(id, ResourceState::Ended));
        assert!(!arena.release(id, ResourceState::Errored));
        assert_eq!(voice.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_all_empties_the_arena() {
        let mut arena = ResourceArena::new();
        let voice = Arc::new(FakeVoice::default());
        playing(&mut arena, &voice);
        playing(&mut arena, &voice);
        arena.reserve(0.5);

        assert_eq!(arena.release_all(), 3);
        assert!(arena.is_empty());
        assert_eq!(arena.release_all(), 0);
    }

    #[tokio::test]
    async fn reclaim_blocked_returns_payload_once() {
        let mut arena = ResourceArena::new();
        let id = arena.reserve(0.8);
        arena.mark_blocked(id, Bytes::from_static(b"payload"));

        let buffer = arena.reclaim_blocked(id).unwrap();
        assert_eq!(&buffer[..], b"payload");
        assert!(arena.reclaim_blocked(id).is_none(), "no longer blocked");
        assert!(!arena.has_capacity(1), "reclaimed resource counts again");
    }

    #[tokio::test]
    async fn set_volume_all_skips_fading() {
        let mut arena = ResourceArena::new();
        let voice = Arc::new(FakeVoice::default());
        let id = playing(&mut arena, &voice);
        arena.set_volume_all(0.3);

        assert!((arena.get(id).unwrap().volume - 0.3).abs() < f32::EPSILON);
        assert!((voice.volumes.try_lock().unwrap().last().unwrap() - 0.3).abs() < f32::EPSILON);
    }
}
