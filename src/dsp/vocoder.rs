//! Channel vocoder: envelope-follower cross-synthesis over a bank of
//! band-pass filters.
//!
//! Each band filters the modulator, follows the magnitude of the result with a
//! slow one-pole, and uses that envelope to weight the same band of the
//! carrier. The weighted carrier bands are summed in wide precision.

use log::debug;

use crate::config::VocoderConfig;
use crate::error::DesignError;

use super::design::design_bandpass;
use super::filter::{CascadedBiquad, SampleWindow};
use super::num::{DspNum, Fixed};

/// One analysis/synthesis band pair.
#[derive(Debug, Clone)]
pub struct VocoderBand<T: DspNum = Fixed> {
    modulator: CascadedBiquad<T>,
    carrier: CascadedBiquad<T>,
    envelope: T,
    /// Centre frequency in cycles per sample.
    center: f64,
}

impl<T: DspNum> VocoderBand<T> {
    pub fn envelope(&self) -> T {
        self.envelope
    }

    pub fn center(&self) -> f64 {
        self.center
    }
}

#[derive(Debug, Clone)]
pub struct Vocoder<T: DspNum = Fixed> {
    bands: Vec<VocoderBand<T>>,

    modulator_window: SampleWindow<T>,
    carrier_window: SampleWindow<T>,
    modulator_smoothed: T,
    carrier_smoothed: T,

    input_rate: T,
    envelope_rate: T,
    level_rate: T,

    /// Slow trackers of `|modulator|` and `|output|` for auto-gain.
    modulator_level: T,
    output_level: T,
    auto_gain: bool,
    auto_gain_limit: T,
}

impl<T: DspNum> Vocoder<T> {
    /// Lay out `config.bands` bands evenly below `config.max_frequency` and
    /// design one filter per band, shared by both roles.
    pub fn new(config: &VocoderConfig, sample_rate: f64) -> Result<Self, DesignError> {
        let division = config.max_frequency / sample_rate / (config.bands + 1) as f64;

        let bands = (1..=config.bands)
            .map(|k| {
                let design = design_bandpass(k as f64 * division, division, config.stages)?;
                Ok(VocoderBand {
                    modulator: CascadedBiquad::from_design(&design)?,
                    carrier: CascadedBiquad::from_design(&design)?,
                    envelope: T::ZERO,
                    center: design.center,
                })
            })
            .collect::<Result<Vec<_>, DesignError>>()?;

        debug!(
            "vocoder: {} bands x {} stages up to {} Hz, auto-gain {}",
            config.bands, config.stages, config.max_frequency, config.auto_gain
        );

        Ok(Vocoder {
            bands,
            modulator_window: SampleWindow::new(),
            carrier_window: SampleWindow::new(),
            modulator_smoothed: T::ZERO,
            carrier_smoothed: T::ZERO,
            input_rate: T::from_f64(config.input_smoothing),
            envelope_rate: T::from_f64(config.envelope_smoothing),
            level_rate: T::from_f64(config.level_smoothing),
            modulator_level: T::ZERO,
            output_level: T::ZERO,
            auto_gain: config.auto_gain,
            auto_gain_limit: T::from_f64(config.auto_gain_limit),
        })
    }

    /// Combine one modulator and one carrier sample into one output sample.
    pub fn process(&mut self, modulator: T, carrier: T) -> T {
        self.modulator_smoothed += (modulator - self.modulator_smoothed).mul(self.input_rate);
        self.carrier_smoothed += (carrier - self.carrier_smoothed).mul(self.input_rate);
        self.modulator_window.push(self.modulator_smoothed);
        self.carrier_window.push(self.carrier_smoothed);

        let mut acc = T::Wide::default();
        for band in &mut self.bands {
            let m = band.modulator.process(&self.modulator_window);
            band.envelope += (m.abs() - band.envelope).mul(self.envelope_rate);

            let c = band.carrier.process(&self.carrier_window);
            acc += c.mul_wide(band.envelope);
        }
        let sum = T::compact(acc);

        self.modulator_level += (modulator.abs() - self.modulator_level).mul(self.level_rate);
        self.output_level += (sum.abs() - self.output_level).mul(self.level_rate);

        if !self.auto_gain {
            return sum;
        }
        // No carrier means no output level: stay silent rather than divide.
        let gain = self
            .modulator_level
            .checked_div(self.output_level)
            .unwrap_or(T::ZERO);
        let gain = if gain > self.auto_gain_limit { self.auto_gain_limit } else { gain };
        sum.mul(gain)
    }

    pub fn bands(&self) -> &[VocoderBand<T>] {
        &self.bands
    }

    pub fn band_envelopes(&self) -> Vec<T> {
        self.bands.iter().map(VocoderBand::envelope).collect()
    }

    /// Band centres in cycles per sample.
    pub fn band_centers(&self) -> Vec<f64> {
        self.bands.iter().map(VocoderBand::center).collect()
    }

    /// `(modulator, output)` levels tracked for auto-gain.
    pub fn levels(&self) -> (T, T) {
        (self.modulator_level, self.output_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use std::f64::consts::PI;

    fn sine<T: DspNum>(freq: f64, amplitude: f64, n: usize) -> T {
        T::from_f64(amplitude * (2.0 * PI * freq * n as f64).sin())
    }

    #[test]
    fn bands_are_evenly_spaced() {
        let v = Vocoder::<Fixed>::new(&VocoderConfig::default(), 44100.0).unwrap();
        let centers = v.band_centers();
        let division = 8000.0 / 44100.0 / 9.0;
        assert_eq!(centers.len(), 8);
        for (k, c) in centers.iter().enumerate() {
            let expected = (k + 1) as f64 * division;
            assert!(approx_eq!(f64, *c, expected, epsilon = 1e-12), "band {k} at {c}");
        }
        assert!(v.bands().iter().all(|b| b.modulator.stages().len() == 4));
    }

    #[test]
    fn bad_stage_count_fails_design() {
        let config = VocoderConfig {
            stages: 3,
            ..VocoderConfig::default()
        };
        let err = Vocoder::<Fixed>::new(&config, 44100.0).unwrap_err();
        assert_eq!(err, DesignError::InvalidOrder { stages: 3 });
    }

    #[test]
    fn fixed_point_limits_band_count() {
        let config = |bands| VocoderConfig {
            bands,
            ..VocoderConfig::default()
        };
        assert_eq!(Vocoder::<Fixed>::new(&config(16), 44100.0).unwrap().bands().len(), 16);

        let err = Vocoder::<Fixed>::new(&config(40), 44100.0).unwrap_err();
        assert!(matches!(err, DesignError::ScaleUnderflow { .. }), "got {err:?}");
        assert_eq!(Vocoder::<f32>::new(&config(40), 44100.0).unwrap().bands().len(), 40);
    }

    #[test]
    fn envelopes_fall_back_after_modulator_stops() {
        let mut v = Vocoder::<Fixed>::new(&VocoderConfig::default(), 44100.0).unwrap();
        let centers = v.band_centers();
        let chord = |n: usize| {
            centers
                .iter()
                .map(|&f| sine::<Fixed>(f, 0.1, n))
                .fold(Fixed::ZERO, |a, b| a + b)
        };

        let mut driven_peak = Fixed::ZERO;
        for n in 0..20_000 {
            let y = v.process(chord(n), chord(n));
            if n > 10_000 {
                driven_peak = driven_peak.max(y.abs());
            }
        }
        let driven = v.band_envelopes();
        assert!(driven.iter().all(|&e| e > Fixed::ZERO), "every band should be driven: {driven:?}");

        let mut tail_peak = Fixed::ZERO;
        for n in 20_000..60_000 {
            let y = v.process(Fixed::ZERO, chord(n));
            if n >= 59_000 {
                tail_peak = tail_peak.max(y.abs());
            }
        }
        let floor = Fixed::from_f64(1e-4);
        for (k, (&after, &before)) in v.band_envelopes().iter().zip(&driven).enumerate() {
            assert!(after < floor, "band {k} envelope stuck at {after:?}");
            assert!(after < before, "band {k} envelope grew from {before:?} to {after:?}");
        }
        assert!(
            tail_peak.to_f64() < driven_peak.to_f64() * 0.01,
            "output {tail_peak:?} did not fall from {driven_peak:?}"
        );
    }

    #[test]
    fn silence_in_silence_out() {
        let mut v = Vocoder::<Fixed>::new(&VocoderConfig::default(), 44100.0).unwrap();
        for _ in 0..1000 {
            assert_eq!(v.process(Fixed::ZERO, Fixed::ZERO), Fixed::ZERO);
        }
        assert!(v.band_envelopes().iter().all(|&e| e == Fixed::ZERO));
    }

    #[test]
    fn silent_carrier_gives_silence() {
        let mut v = Vocoder::<Fixed>::new(&VocoderConfig::default(), 44100.0).unwrap();
        for n in 0..2000 {
            let y = v.process(sine(0.03, 0.5, n), Fixed::ZERO);
            assert_eq!(y, Fixed::ZERO);
        }
        assert!(v.band_envelopes().iter().any(|&e| e > Fixed::ZERO));
    }

    #[test]
    fn silent_modulator_gives_silence() {
        let mut v = Vocoder::<Fixed>::new(&VocoderConfig::default(), 44100.0).unwrap();
        for n in 0..2000 {
            assert_eq!(v.process(Fixed::ZERO, sine(0.03, 0.5, n)), Fixed::ZERO);
        }
    }

    #[test]
    fn envelope_follows_matching_band() {
        let mut v = Vocoder::<f32>::new(&VocoderConfig::default(), 44100.0).unwrap();
        let target = 1;
        let freq = v.band_centers()[target];
        for n in 0..20_000 {
            v.process(sine(freq, 0.5, n), 0.0);
        }
        let env = v.band_envelopes();
        for (k, &e) in env.iter().enumerate() {
            if k != target {
                assert!(
                    env[target] > 2.0 * e,
                    "band {target} ({}) should dominate band {k} ({e})",
                    env[target]
                );
            }
        }
    }

    #[test]
    fn tone_through_both_inputs_is_audible() {
        let mut v = Vocoder::<Fixed>::new(&VocoderConfig::default(), 44100.0).unwrap();
        let freq = v.band_centers()[0];
        let mut peak = Fixed::ZERO;
        for n in 0..20_000 {
            let x = sine(freq, 0.5, n);
            let y = v.process(x, x);
            if n > 10_000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > Fixed::ZERO, "vocoded tone should be audible");
        assert!(peak < Fixed::ONE, "vocoded tone peak {peak:?} too loud");
    }

    #[test]
    fn auto_gain_without_carrier_stays_silent() {
        let config = VocoderConfig {
            auto_gain: true,
            ..VocoderConfig::default()
        };
        let mut v = Vocoder::<Fixed>::new(&config, 44100.0).unwrap();
        for n in 0..2000 {
            assert_eq!(v.process(sine(0.03, 0.5, n), Fixed::ZERO), Fixed::ZERO);
        }
        let (modulator, output) = v.levels();
        assert!(modulator > Fixed::ZERO);
        assert_eq!(output, Fixed::ZERO);
    }

    #[test]
    fn auto_gain_is_clamped() {
        let config = VocoderConfig {
            auto_gain: true,
            auto_gain_limit: 2.0,
            ..VocoderConfig::default()
        };
        let mut plain = Vocoder::<f32>::new(&VocoderConfig::default(), 44100.0).unwrap();
        let mut boosted = Vocoder::<f32>::new(&config, 44100.0).unwrap();
        let freq = plain.band_centers()[2];
        for n in 0..5000 {
            let x = sine(freq, 0.5, n);
            let a: f32 = plain.process(x, x);
            let b: f32 = boosted.process(x, x);
            assert!(b.abs() <= 2.0 * a.abs() + 1e-6, "sample {n}: {b} exceeds limit over {a}");
        }
    }
}
