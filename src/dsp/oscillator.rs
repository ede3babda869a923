//! Band-limited saw/square oscillator and per-voice noise.
//!
//! The naive waveform aliases badly at high notes. Instead of evaluating it
//! once per sample, the oscillator evaluates it at a small constellation of
//! phases around the current one (spaced in fractions of the phase step) and
//! sums them with sinc-derived weights, which approximates convolving the
//! waveform with a low-pass kernel scaled to the oscillator's own step.

use std::f64::consts::PI;

use super::num::{DspNum, Fixed};

/// Taps on each side of the centre tap.
pub const QUADRATURE_HALF_WIDTH: usize = 3;

/// Distance between taps, in phase steps.
pub const QUADRATURE_SPACING: f64 = 0.25;

/// Right shift applied to every voice so a full pool stays inside `[-1, 1]`.
pub const VOICE_LEVEL_SHIFT: u32 = 2;

/// Tap offsets and weights for the band-limiting sum.
#[derive(Debug, Clone)]
pub struct SincQuadrature<T: DspNum = Fixed> {
    /// Offsets in units of the phase step, symmetric around zero.
    offsets: Vec<T>,
    /// Weights summing to one; the centre tap is the largest.
    weights: Vec<T>,
}

impl<T: DspNum> SincQuadrature<T> {
    pub fn new(half_width: usize, spacing: f64) -> Self {
        let taps: Vec<f64> = (-(half_width as isize)..=half_width as isize)
            .map(|k| k as f64 * spacing)
            .collect();
        let raw: Vec<f64> = taps.iter().map(|&t| sinc(t)).collect();
        let total: f64 = raw.iter().sum();

        SincQuadrature {
            offsets: taps.iter().map(|&t| T::from_f64(t)).collect(),
            weights: raw.iter().map(|&w| T::from_f64(w / total)).collect(),
        }
    }

    pub fn offsets(&self) -> &[T] {
        &self.offsets
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }
}

impl<T: DspNum> Default for SincQuadrature<T> {
    fn default() -> Self {
        Self::new(QUADRATURE_HALF_WIDTH, QUADRATURE_SPACING)
    }
}

fn sinc(t: f64) -> f64 {
    if t == 0.0 { 1.0 } else { (PI * t).sin() / (PI * t) }
}

/// Sawtooth falling from 1 to -1 across the cycle.
#[inline]
fn sawtooth<T: DspNum>(phase: T) -> T {
    T::ONE - phase.shl(1)
}

#[inline]
fn square<T: DspNum>(phase: T) -> T {
    if phase < T::ONE.shr(1) { T::ONE } else { -T::ONE }
}

/// Naive (aliasing) blend: `shape = 0` is a sawtooth, `shape = 1` a square.
#[inline]
pub fn naive_waveform<T: DspNum>(phase: T, shape: T) -> T {
    let saw = sawtooth(phase);
    saw + shape.mul(square(phase) - saw)
}

/// Phase accumulator in `[0, 1)` with a per-note step.
#[derive(Debug, Clone, Default)]
pub struct Oscillator<T: DspNum = Fixed> {
    phase: T,
    phase_step: T,
}

impl<T: DspNum> Oscillator<T> {
    pub fn new() -> Self {
        Oscillator {
            phase: T::ZERO,
            phase_step: T::ZERO,
        }
    }

    pub fn set_phase_step(&mut self, step: T) {
        self.phase_step = step;
    }

    pub fn phase(&self) -> T {
        self.phase
    }

    pub fn phase_step(&self) -> T {
        self.phase_step
    }

    /// Advance by `phase_step × tuning` and return the band-limited sample,
    /// already attenuated by [`VOICE_LEVEL_SHIFT`].
    pub fn next_sample(&mut self, tuning: T, shape: T, quadrature: &SincQuadrature<T>) -> T {
        let step = self.phase_step.mul(tuning);
        self.phase = (self.phase + step).wrap_unit();

        let mut acc = T::Wide::default();
        for (&offset, &weight) in quadrature.offsets.iter().zip(&quadrature.weights) {
            let phase = (self.phase + offset.mul(step)).wrap_unit();
            acc += naive_waveform(phase, shape).mul_wide(weight);
        }
        T::compact(acc).shr(VOICE_LEVEL_SHIFT)
    }
}

/// Cheap multiplicative-congruential noise, one per voice.
#[derive(Debug, Clone, Default)]
pub struct NoiseGenerator {
    state: i32,
}

impl NoiseGenerator {
    const MULTIPLIER: i32 = 12_347_843;

    pub fn with_seed(seed: i32) -> Self {
        NoiseGenerator { state: seed }
    }

    /// Next value in `[-1, 1)`.
    pub fn next_sample<T: DspNum>(&mut self) -> T {
        self.state = self.state.wrapping_add(1).wrapping_mul(Self::MULTIPLIER);
        T::from_unit_bits(self.state)
    }
}
