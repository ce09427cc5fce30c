//! Audio settings domain types and validation.
//!
//! These are pure domain types with no infrastructure dependencies. All
//! fields are clamped on write so the rest of the engine can rely on the
//! documented ranges without re-checking.

use serde::{Deserialize, Serialize};

/// Smallest permitted active-set bound.
pub const MIN_CONCURRENT_AUDIO: u8 = 1;

/// Largest permitted active-set bound.
pub const MAX_CONCURRENT_AUDIO: u8 = 10;

/// Longest permitted eviction fade-out, in milliseconds.
pub const MAX_FADE_OUT_MS: u64 = 5000;

/// Default number of concurrently playing narration resources.
pub const DEFAULT_MAX_CONCURRENT_AUDIO: u8 = 3;

/// Default playback volume for new resources.
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Default eviction fade-out duration, in milliseconds.
pub const DEFAULT_FADE_OUT_MS: u64 = 500;

/// Default pacing delay between drained queue items, in milliseconds.
pub const DEFAULT_QUEUE_DELAY_MS: u64 = 250;

/// Runtime-tunable audio engine settings.
///
/// Every field is kept inside its documented range by [`clamped`]; the
/// engine applies partial updates through [`AudioSettingsPatch`] so hosts
/// can change one knob without restating the others.
///
/// [`clamped`]: AudioSettings::clamped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// Upper bound on concurrently playing resources (1–10).
    pub max_concurrent_audio: u8,

    /// Base volume for new resources and the global volume setter (0.0–1.0).
    pub default_volume: f32,

    /// Duration of the eviction fade-out ramp in milliseconds (0–5000).
    pub fade_out_duration_ms: u64,

    /// Pacing delay between drained queue items; the drain also reschedules
    /// itself after twice this interval when capacity stays full.
    pub queue_processing_delay_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            max_concurrent_audio: DEFAULT_MAX_CONCURRENT_AUDIO,
            default_volume: DEFAULT_VOLUME,
            fade_out_duration_ms: DEFAULT_FADE_OUT_MS,
            queue_processing_delay_ms: DEFAULT_QUEUE_DELAY_MS,
        }
    }
}

impl AudioSettings {
    /// Return a copy with every field forced into its valid range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.max_concurrent_audio = self
            .max_concurrent_audio
            .clamp(MIN_CONCURRENT_AUDIO, MAX_CONCURRENT_AUDIO);
        self.default_volume = if self.default_volume.is_finite() {
            self.default_volume.clamp(0.0, 1.0)
        } else {
            DEFAULT_VOLUME
        };
        self.fade_out_duration_ms = self.fade_out_duration_ms.min(MAX_FADE_OUT_MS);
        self
    }

    /// Merge a partial update into these settings, clamping the result.
    pub fn apply(&mut self, patch: AudioSettingsPatch) {
        if let Some(max) = patch.max_concurrent_audio {
            self.max_concurrent_audio = max;
        }
        if let Some(volume) = patch.default_volume {
            self.default_volume = volume;
        }
        if let Some(fade) = patch.fade_out_duration_ms {
            self.fade_out_duration_ms = fade;
        }
        if let Some(delay) = patch.queue_processing_delay_ms {
            self.queue_processing_delay_ms = delay;
        }
        *self = self.clamped();
    }
}

/// Partial update for [`AudioSettings`].
///
/// All fields are optional to support partial updates; unrecognized fields
/// in incoming payloads are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettingsPatch {
    /// New active-set bound, if changing.
    pub max_concurrent_audio: Option<u8>,

    /// New base volume, if changing.
    pub default_volume: Option<f32>,

    /// New fade-out duration, if changing.
    pub fade_out_duration_ms: Option<u64>,

    /// New queue pacing delay, if changing.
    pub queue_processing_delay_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_valid() {
        let settings = AudioSettings::default();
        assert_eq!(settings, settings.clamped());
    }

    #[test]
    fn clamp_forces_ranges() {
        let settings = AudioSettings {
            max_concurrent_audio: 50,
            default_volume: 2.5,
            fade_out_duration_ms: 60_000,
            queue_processing_delay_ms: 100,
        }
        .clamped();

        assert_eq!(settings.max_concurrent_audio, MAX_CONCURRENT_AUDIO);
        assert!((settings.default_volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(settings.fade_out_duration_ms, MAX_FADE_OUT_MS);
        assert_eq!(settings.queue_processing_delay_ms, 100);
    }

    #[test]
    fn clamp_raises_zero_concurrency_to_minimum() {
        let settings = AudioSettings {
            max_concurrent_audio: 0,
            ..AudioSettings::default()
        }
        .clamped();
        assert_eq!(settings.max_concurrent_audio, MIN_CONCURRENT_AUDIO);
    }

    #[test]
    fn non_finite_volume_falls_back_to_default() {
        let settings = AudioSettings {
            default_volume: f32::NAN,
            ..AudioSettings::default()
        }
        .clamped();
        assert!((settings.default_volume - DEFAULT_VOLUME).abs() < f32::EPSILON);
    }

    #[test]
    fn patch_applies_only_named_fields() {
        let mut settings = AudioSettings::default();
        settings.apply(AudioSettingsPatch {
            max_concurrent_audio: Some(1),
            default_volume: None,
            fade_out_duration_ms: None,
            queue_processing_delay_ms: Some(0),
        });

        assert_eq!(settings.max_concurrent_audio, 1);
        assert_eq!(settings.queue_processing_delay_ms, 0);
        assert!((settings.default_volume - DEFAULT_VOLUME).abs() < f32::EPSILON);
        assert_eq!(settings.fade_out_duration_ms, DEFAULT_FADE_OUT_MS);
    }

    #[test]
    fn patch_result_is_clamped() {
        let mut settings = AudioSettings::default();
        settings.apply(AudioSettingsPatch {
            default_volume: Some(-3.0),
            ..AudioSettingsPatch::default()
        });
        assert!(settings.default_volume.abs() < f32::EPSILON);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_value(AudioSettings::default()).unwrap();
        assert!(json.get("maxConcurrentAudio").is_some());
        assert!(json.get("queueProcessingDelayMs").is_some());
    }

    #[test]
    fn patch_deserializes_from_partial_payload() {
        let patch: AudioSettingsPatch =
            serde_json::from_str(r#"{"fadeOutDurationMs": 1000}"#).unwrap();
        assert_eq!(patch.fade_out_duration_ms, Some(1000));
        assert_eq!(patch.max_concurrent_audio, None);
    }
}
