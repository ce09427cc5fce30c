//! Procedural sound-effect buffers.
//!
//! Stateless helpers that synthesize the game's short UI effects as PCM
//! sample buffers. Playback is the host's concern; this module only
//! generates.

/// Sample rate of generated effect buffers, in Hz.
pub const EFFECT_SAMPLE_RATE: u32 = 44_100;

/// The game's stock effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// Short click for bubble placement.
    Pop,

    /// Two-note score chime.
    Chime,

    /// Descending sweep for dismissals.
    Swoosh,

    /// Harsh buzz for invalid moves.
    Buzzer,
}

/// Mono f32 PCM at [`EFFECT_SAMPLE_RATE`], in `[-1.0, 1.0]`.
#[must_use]
pub fn generate_buffer(kind: EffectKind) -> Vec<f32> {
    match kind {
        EffectKind::Pop => tone(880.0, 0.08, 0.5, 40.0),
        EffectKind::Chime => {
            let mut buffer = tone(523.25, 0.12, 0.4, 12.0);
            buffer.extend(tone(783.99, 0.18, 0.4, 10.0));
            buffer
        }
        EffectKind::Swoosh => sweep(900.0, 200.0, 0.25, 0.35),
        EffectKind::Buzzer => square(110.0, 0.3, 0.3),
    }
}

/// Exponentially decaying sine burst.
fn tone(freq: f32, seconds: f32, gain: f32, decay: f32) -> Vec<f32> {
    samples(seconds)
        .map(|t| (t * freq * std::f32::consts::TAU).sin() * gain * (-t * decay).exp())
        .collect()
}

/// Linear frequency sweep with a fade-out envelope.
fn sweep(from_hz: f32, to_hz: f32, seconds: f32, gain: f32) -> Vec<f32> {
    samples(seconds)
        .map(|t| {
            let progress = t / seconds;
            let freq = from_hz + (to_hz - from_hz) * progress;
            (t * freq * std::f32::consts::TAU).sin() * gain * (1.0 - progress)
        })
        .collect()
}

/// Square wave with a fade-out envelope.
fn square(freq: f32, seconds: f32, gain: f32) -> Vec<f32> {
    samples(seconds)
        .map(|t| {
            let progress = t / seconds;
            let s = if (t * freq * std::f32::consts::TAU).sin() >= 0.0 {
                gain
            } else {
                -gain
            };
            s * (1.0 - progress)
        })
        .collect()
}

/// Iterator over sample timestamps for a duration.
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn samples(seconds: f32) -> impl Iterator<Item = f32> {
    let count = (seconds * EFFECT_SAMPLE_RATE as f32) as usize;
    (0..count).map(|i| i as f32 / EFFECT_SAMPLE_RATE as f32)
}
