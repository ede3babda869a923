//! Voice — one note slot of the synthesizer pool.

use crate::params::AudioParams;

use super::envelope::{Envelope, EnvelopeRates, EnvelopeState};
use super::num::{DspNum, Fixed};
use super::oscillator::{NoiseGenerator, Oscillator, SincQuadrature};

/// A single voice: band-limited oscillator, noise and ADSR envelope.
#[derive(Debug, Clone)]
pub struct SynthVoice<T: DspNum = Fixed> {
    /// Note currently (or last) assigned to this voice.
    note: Option<usize>,
    /// Allocation stamp used for voice stealing; larger is newer.
    age: u32,
    oscillator: Oscillator<T>,
    noise: NoiseGenerator,
    envelope: Envelope<T>,
    /// Last oscillator sample, before the envelope.
    sample: T,
}

impl<T: DspNum> SynthVoice<T> {
    /// An idle voice. `noise_seed` keeps the per-voice noise streams apart.
    pub fn new(noise_seed: i32, epsilon: T) -> Self {
        SynthVoice {
            note: None,
            age: 0,
            oscillator: Oscillator::new(),
            noise: NoiseGenerator::with_seed(noise_seed),
            envelope: Envelope::new(epsilon),
            sample: T::ZERO,
        }
    }

    /// Start `note` from silence with the given phase step.
    pub fn note_on(&mut self, note: usize, phase_step: T, age: u32) {
        self.note = Some(note);
        self.age = age;
        self.oscillator.set_phase_step(phase_step);
        self.envelope.gate_on();
    }

    pub fn note_off(&mut self) {
        self.envelope.gate_off();
    }

    /// Advance one sample and return `oscillator × envelope` in accumulator
    /// width so the pool can sum voices before rounding.
    pub fn process(&mut self, params: &AudioParams<T>, quadrature: &SincQuadrature<T>) -> T::Wide {
        let rates = EnvelopeRates {
            attack: params.attack,
            decay: params.decay,
            sustain: params.sustain,
            release: params.release,
        };
        let level = self.envelope.tick(&rates);

        let osc = self.oscillator.next_sample(params.tuning, params.shape, quadrature);
        let noise: T = self.noise.next_sample();
        self.sample = osc + osc.mul(noise.mul(params.noise_gain));

        self.sample.mul_wide(level)
    }

    pub fn note(&self) -> Option<usize> {
        self.note
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    pub fn envelope(&self) -> T {
        self.envelope.level()
    }

    pub fn sample(&self) -> T {
        self.sample
    }

    pub fn phase_step(&self) -> T {
        self.oscillator.phase_step()
    }

    /// Whether the voice can be reused without stealing.
    pub fn is_free(&self) -> bool {
        self.envelope.is_free()
    }
}
