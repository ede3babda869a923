//! Engine configuration, loaded from JSON and validated before any filter is
//! designed.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::dsp::num::Fixed;
use crate::error::{EngineError, Result};
use crate::params::{AudioParams, MultiplexEntry, default_sequence};

/// Voice pool and note table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthConfig {
    pub voices: usize,
    pub notes: usize,
    /// Frequency of note 0 in Hz.
    pub base_frequency: f64,
    /// Distance at which an envelope segment snaps to its target.
    pub envelope_epsilon: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            voices: 4,
            notes: 64,
            base_frequency: 110.0,
            envelope_epsilon: 1.0 / 1024.0,
        }
    }
}

/// Band layout and smoothing rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VocoderConfig {
    pub bands: usize,
    /// Biquads per band filter; even and at least 2.
    pub stages: usize,
    /// Upper edge of the band layout in Hz.
    pub max_frequency: f64,
    /// One-pole rate of the shared input smoothing.
    pub input_smoothing: f64,
    /// One-pole rate of each band's envelope follower.
    pub envelope_smoothing: f64,
    /// One-pole rate of the overall level trackers used by auto-gain.
    pub level_smoothing: f64,
    pub auto_gain: bool,
    pub auto_gain_limit: f64,
}

impl Default for VocoderConfig {
    fn default() -> Self {
        VocoderConfig {
            bands: 8,
            stages: 4,
            max_frequency: 8000.0,
            input_smoothing: 0.08,
            envelope_smoothing: 0.008,
            level_smoothing: 0.0008,
            auto_gain: false,
            auto_gain_limit: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub synth: SynthConfig,
    pub vocoder: VocoderConfig,
    /// Starting parameter snapshot.
    pub params: AudioParams<Fixed>,
    /// Knob order for the control multiplexer.
    pub multiplexer: Vec<MultiplexEntry>,
    /// Audio samples between two multiplexer reads.
    pub control_interval: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100.0,
            synth: SynthConfig::default(),
            vocoder: VocoderConfig::default(),
            params: AudioParams::default(),
            multiplexer: default_sequence(),
            control_interval: 46,
        }
    }
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig(msg.into())
}

pub(crate) fn check_rate(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be in (0, 1], got {value}")))
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make filter design or the fixed-point
    /// tables meaningless.
    pub fn validate(&self) -> Result<()> {
        let nyquist = self.sample_rate / 2.0;
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(invalid(format!("sample rate must be positive, got {}", self.sample_rate)));
        }

        if self.control_interval == 0 {
            return Err(invalid("control interval must be at least one sample"));
        }

        let synth = &self.synth;
        if synth.voices == 0 {
            return Err(invalid("synth needs at least one voice"));
        }
        if synth.notes == 0 {
            return Err(invalid("note table must not be empty"));
        }
        if !synth.base_frequency.is_finite() || synth.base_frequency <= 0.0 {
            return Err(invalid(format!(
                "base frequency must be positive, got {}",
                synth.base_frequency
            )));
        }
        let top = synth.base_frequency * 2f64.powf((synth.notes - 1) as f64 / 12.0);
        if top >= nyquist {
            return Err(invalid(format!(
                "highest note ({top:.1} Hz) must be below Nyquist ({nyquist} Hz)"
            )));
        }
        if !(synth.envelope_epsilon > 0.0 && synth.envelope_epsilon < 1.0) {
            return Err(invalid(format!(
                "envelope epsilon must be in (0, 1), got {}",
                synth.envelope_epsilon
            )));
        }
        if synth.voices > 4 {
            warn!(
                "{} voices can sum past full scale; voices are only attenuated for 4",
                synth.voices
            );
        }

        let voc = &self.vocoder;
        if voc.bands == 0 {
            return Err(invalid("vocoder needs at least one band"));
        }
        if voc.stages < 2 || voc.stages % 2 != 0 {
            return Err(invalid(format!("stage count must be even and >= 2, got {}", voc.stages)));
        }
        if !(voc.max_frequency > 0.0 && voc.max_frequency <= nyquist) {
            return Err(invalid(format!(
                "max frequency must be in (0, {nyquist}] Hz, got {}",
                voc.max_frequency
            )));
        }
        check_rate("input smoothing", voc.input_smoothing)?;
        check_rate("envelope smoothing", voc.envelope_smoothing)?;
        check_rate("level smoothing", voc.level_smoothing)?;
        let limit = voc.auto_gain_limit;
        if !(limit.is_finite() && limit > 0.0 && limit < 8.0) {
            return Err(invalid(format!(
                "auto-gain limit must be in (0, 8), got {limit}"
            )));
        }

        self.params.validate()
    }
}
