//! Per-voice envelope and pitch-glide curves for the PIANO and RISE
//! waveforms. All curves are functions of voice age in seconds.

/// A decaying voice whose level falls below this is dead and gets
/// evicted by the render path.
pub const VOICE_DEATH_LEVEL: f32 = 0.01;

/// PIANO amplitude: exponential decay `exp(-3t)`.
pub fn piano_level(t: f32) -> f32 {
    (-3.0 * t).exp()
}

/// PIANO pitch factor: 50 ms downward glide from +5% to unity.
pub fn piano_glide(t: f32) -> f32 {
    1.05 - 0.05 * (t / 0.05).min(1.0)
}

/// RISE amplitude: 300 ms linear attack.
pub fn rise_level(t: f32) -> f32 {
    (t / 0.3).min(1.0)
}

/// RISE pitch factor: 50 ms upward glide from -5% to unity.
pub fn rise_glide(t: f32) -> f32 {
    0.95 + 0.05 * (t / 0.05).min(1.0)
}
