//! Audio parameters and the slow-control multiplexer.
//!
//! [`AudioParams`] is the snapshot the synthesizer and engine read once per
//! sample. Hardware knobs reach it through a [`ParamMultiplexer`]: each tick
//! reads one raw ADC value from a [`ControlSource`], runs it through the
//! entry's [`ParamTransform`] and writes the named [`ParamTarget`].
//! Transforms run in `f64`; they fire a few hundred times per second at most.

use serde::{Deserialize, Serialize};

use crate::config::check_rate;
use crate::dsp::num::{DspNum, Fixed};
use crate::error::{EngineError, Result};

/// Full-scale raw reading from the control ADC.
pub const ADC_INPUT_MAX: u32 = 65536;

/// Largest accepted output gain.
pub const MAX_GAIN: f64 = 4.0;

/// Largest accepted tuning multiplier: two octaves up.
pub const MAX_TUNING: f64 = 4.0;

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be in [{min}, {max}], got {value}"
        )))
    }
}

/// Per-sample parameter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioParams<T: DspNum = Fixed> {
    /// Attack rate: fraction of the remaining distance covered per sample.
    pub attack: T,
    /// Decay rate toward `sustain`.
    pub decay: T,
    /// Sustain level [0, 1].
    pub sustain: T,
    /// Release rate toward zero.
    pub release: T,
    /// Gain applied to the vocoded output.
    pub output_gain: T,
    /// Depth of the multiplicative per-voice noise.
    pub noise_gain: T,
    /// Multiplier on every voice's phase step (1.0 = concert pitch).
    pub tuning: T,
    /// Oscillator blend: 0 = sawtooth, 1 = square.
    pub shape: T,
}

impl<T: DspNum> Default for AudioParams<T> {
    fn default() -> Self {
        AudioParams {
            attack: T::from_f64(0.01),
            decay: T::from_f64(0.001),
            sustain: T::from_f64(0.75),
            release: T::from_f64(0.0005),
            output_gain: T::ONE,
            noise_gain: T::from_f64(1.0 / 32.0),
            tuning: T::ONE,
            shape: T::ZERO,
        }
    }
}

/// A writable field of [`AudioParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamTarget {
    Attack,
    Decay,
    Sustain,
    Release,
    OutputGain,
    NoiseGain,
    Tuning,
    Shape,
}

impl<T: DspNum> AudioParams<T> {
    pub fn get(&self, target: ParamTarget) -> T {
        match target {
            ParamTarget::Attack => self.attack,
            ParamTarget::Decay => self.decay,
            ParamTarget::Sustain => self.sustain,
            ParamTarget::Release => self.release,
            ParamTarget::OutputGain => self.output_gain,
            ParamTarget::NoiseGain => self.noise_gain,
            ParamTarget::Tuning => self.tuning,
            ParamTarget::Shape => self.shape,
        }
    }

    pub fn set(&mut self, target: ParamTarget, value: T) {
        let field = match target {
            ParamTarget::Attack => &mut self.attack,
            ParamTarget::Decay => &mut self.decay,
            ParamTarget::Sustain => &mut self.sustain,
            ParamTarget::Release => &mut self.release,
            ParamTarget::OutputGain => &mut self.output_gain,
            ParamTarget::NoiseGain => &mut self.noise_gain,
            ParamTarget::Tuning => &mut self.tuning,
            ParamTarget::Shape => &mut self.shape,
        };
        *field = value;
    }

    /// Reject snapshots the voices cannot play: a zero envelope rate never
    /// leaves its segment, and out-of-range levels overdrive the voice sum.
    pub fn validate(&self) -> Result<()> {
        check_rate("attack", self.attack.to_f64())?;
        check_rate("decay", self.decay.to_f64())?;
        check_rate("release", self.release.to_f64())?;
        check_range("sustain", self.sustain.to_f64(), 0.0, 1.0)?;
        check_range("noise gain", self.noise_gain.to_f64(), 0.0, 1.0)?;
        check_range("shape", self.shape.to_f64(), 0.0, 1.0)?;
        check_range("output gain", self.output_gain.to_f64(), 0.0, MAX_GAIN)?;

        let tuning = self.tuning.to_f64();
        if !(tuning > 0.0 && tuning <= MAX_TUNING) {
            return Err(EngineError::InvalidConfig(format!(
                "tuning must be in (0, {MAX_TUNING}], got {tuning}"
            )));
        }
        Ok(())
    }

    /// The same snapshot in another numeric representation.
    pub fn convert<U: DspNum>(&self) -> AudioParams<U> {
        let c = |v: T| U::from_f64(v.to_f64());
        AudioParams {
            attack: c(self.attack),
            decay: c(self.decay),
            sustain: c(self.sustain),
            release: c(self.release),
            output_gain: c(self.output_gain),
            noise_gain: c(self.noise_gain),
            tuning: c(self.tuning),
            shape: c(self.shape),
        }
    }
}

/// Mapping from a raw ADC reading to a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamTransform {
    /// `raw / 65536`, in `[0, 1)`.
    Linear,
    /// `0.9999^raw`: full gain at zero, falling off exponentially.
    Gain,
    /// `0.01 · 0.9999^raw`: a one-pole rate for envelope segments.
    ExponentialLerpFactor,
    /// `2^(2·raw/65536 − 1)`: one octave either side of concert pitch.
    Octave,
}

impl ParamTransform {
    pub fn apply(self, raw: u32) -> f64 {
        let raw = raw.min(ADC_INPUT_MAX) as f64;
        match self {
            ParamTransform::Linear => raw / ADC_INPUT_MAX as f64,
            ParamTransform::Gain => 0.9999f64.powf(raw),
            ParamTransform::ExponentialLerpFactor => 0.01 * 0.9999f64.powf(raw),
            ParamTransform::Octave => 2f64.powf(2.0 * raw / ADC_INPUT_MAX as f64 - 1.0),
        }
    }
}

/// One step of the multiplexer sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplexEntry {
    pub target: ParamTarget,
    pub transform: ParamTransform,
}

impl MultiplexEntry {
    pub const fn new(target: ParamTarget, transform: ParamTransform) -> Self {
        MultiplexEntry { target, transform }
    }
}

/// The knob order wired to the analog multiplexer.
pub fn default_sequence() -> Vec<MultiplexEntry> {
    use ParamTarget::*;
    use ParamTransform::*;
    vec![
        MultiplexEntry::new(OutputGain, Gain),
        MultiplexEntry::new(Attack, ExponentialLerpFactor),
        MultiplexEntry::new(Decay, ExponentialLerpFactor),
        MultiplexEntry::new(Sustain, Linear),
        MultiplexEntry::new(Release, ExponentialLerpFactor),
        MultiplexEntry::new(NoiseGain, Gain),
        MultiplexEntry::new(Tuning, Octave),
        MultiplexEntry::new(Shape, Linear),
    ]
}

/// The hardware side of the multiplexer: one shared ADC channel behind an
/// address-selected analog switch.
pub trait ControlSource {
    /// Latest raw reading for the currently selected address.
    fn read(&mut self) -> u32;

    /// Route `address` to the ADC. Implementations should change low address
    /// bits first and discard readings taken before the switch settled.
    fn select(&mut self, address: usize);
}

/// Cycles through a list of `(target, transform)` entries, one per tick.
#[derive(Debug, Clone)]
pub struct ParamMultiplexer {
    sequence: Vec<MultiplexEntry>,
    cursor: usize,
}

impl ParamMultiplexer {
    pub fn new(sequence: Vec<MultiplexEntry>) -> Self {
        ParamMultiplexer { sequence, cursor: 0 }
    }

    /// Address that the next tick will read.
    pub fn address(&self) -> usize {
        self.cursor
    }

    pub fn sequence(&self) -> &[MultiplexEntry] {
        &self.sequence
    }

    /// Read the current address into `params`, then select the next one.
    /// Returns the target written, or `None` for an empty sequence.
    pub fn tick<T: DspNum>(
        &mut self,
        source: &mut impl ControlSource,
        params: &mut AudioParams<T>,
    ) -> Option<ParamTarget> {
        let entry = *self.sequence.get(self.cursor)?;
        let raw = source.read();
        params.set(entry.target, T::from_f64(entry.transform.apply(raw)));

        self.cursor = (self.cursor + 1) % self.sequence.len();
        source.select(self.cursor);
        Some(entry.target)
    }
}

impl Default for ParamMultiplexer {
    fn default() -> Self {
        Self::new(default_sequence())
    }
}
