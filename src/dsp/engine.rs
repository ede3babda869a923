//! Engine — the per-sample host loop body and offline rendering.
//!
//! The engine owns one synthesizer, one vocoder and the current parameter
//! snapshot. Each sample the synthesizer produces the carrier, the vocoder
//! combines it with the modulator and the output gain is applied. Slow
//! controls are read through the parameter multiplexer every
//! `control_interval` samples.

use log::debug;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::params::{AudioParams, ControlSource, ParamMultiplexer};

use super::num::{DspNum, Fixed};
use super::synth::Synth;
use super::vocoder::Vocoder;

/// Samples between two `debug!` dumps of the held notes.
pub const NOTE_LOG_INTERVAL: u32 = 500;

pub struct Engine<T: DspNum = Fixed> {
    synth: Synth<T>,
    vocoder: Vocoder<T>,
    params: AudioParams<T>,
    multiplexer: ParamMultiplexer,
    control_interval: u32,
    control_countdown: u32,
    note_log_countdown: u32,
    sample_rate: f64,
}

impl<T: DspNum> Engine<T> {
    /// Validate `config`, design the vocoder filters and build the voice pool.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let vocoder = Vocoder::new(&config.vocoder, config.sample_rate)?;
        let synth = Synth::new(&config.synth, config.sample_rate);
        debug!("engine ready at {} Hz", config.sample_rate);

        Ok(Engine {
            synth,
            vocoder,
            params: config.params.convert(),
            multiplexer: ParamMultiplexer::new(config.multiplexer.clone()),
            control_interval: config.control_interval,
            control_countdown: config.control_interval,
            note_log_countdown: NOTE_LOG_INTERVAL,
            sample_rate: config.sample_rate,
        })
    }

    pub fn press(&mut self, note: usize) -> Result<usize> {
        self.synth.press(note)
    }

    pub fn release(&mut self, note: usize) {
        self.synth.release(note);
    }

    /// One output sample: `vocoder(modulator, synth()) × output_gain`.
    pub fn process(&mut self, modulator: T) -> T {
        let carrier = self.synth.process(&self.params);
        self.vocoder.process(modulator, carrier).mul(self.params.output_gain)
    }

    /// [`Engine::process`] plus the slow-control schedule: every
    /// `control_interval` samples one multiplexer entry is read from
    /// `controls` before the audio is computed, and every
    /// [`NOTE_LOG_INTERVAL`] samples the held notes are logged.
    pub fn process_with_controls(&mut self, modulator: T, controls: &mut impl ControlSource) -> T {
        self.control_countdown -= 1;
        if self.control_countdown == 0 {
            self.control_countdown = self.control_interval;
            self.multiplexer.tick(controls, &mut self.params);
        }
        self.note_log_countdown -= 1;
        if self.note_log_countdown == 0 {
            self.note_log_countdown = NOTE_LOG_INTERVAL;
            self.synth.log_active_notes();
        }
        self.process(modulator)
    }

    /// Run only the synthesizer for `frames` samples.
    pub fn render_synth(&mut self, frames: usize) -> Vec<T> {
        (0..frames).map(|_| self.synth.process(&self.params)).collect()
    }

    /// Vocode a modulator buffer against the engine's own synthesizer.
    pub fn vocode(&mut self, modulator: &[T]) -> Vec<T> {
        modulator.iter().map(|&m| self.process(m)).collect()
    }

    /// Vocode two external buffers, bypassing the synthesizer and the output
    /// gain. The output is as long as the longer input; the shorter one is
    /// padded with silence.
    pub fn vocode_carrier(&mut self, modulator: &[T], carrier: &[T]) -> Vec<T> {
        let frames = modulator.len().max(carrier.len());
        (0..frames)
            .map(|i| {
                let m = modulator.get(i).copied().unwrap_or(T::ZERO);
                let c = carrier.get(i).copied().unwrap_or(T::ZERO);
                self.vocoder.process(m, c)
            })
            .collect()
    }

    pub fn params(&self) -> &AudioParams<T> {
        &self.params
    }

    /// Replace the parameter snapshot. Invalid snapshots are rejected and
    /// the current one is kept.
    pub fn set_params(&mut self, params: AudioParams<T>) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn synth(&self) -> &Synth<T> {
        &self.synth
    }

    pub fn vocoder(&self) -> &Vocoder<T> {
        &self.vocoder
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

// ── Offline helpers ─────────────────────────────────────────

/// The chord the offline tools play: root, fifth, octave and a high third.
pub const DEMO_CHORD: [usize; 4] = [0, 7, 12, 28];

fn to_engine<T: DspNum>(samples: &[f32]) -> Vec<T> {
    samples.iter().map(|&s| T::from_f64(s as f64)).collect()
}

fn from_engine<T: DspNum>(samples: &[T]) -> Vec<f32> {
    samples.iter().map(|s| s.to_f64() as f32).collect()
}

fn engine_with_notes(config: &EngineConfig, notes: &[usize]) -> Result<Engine> {
    let mut engine = Engine::new(config)?;
    for &note in notes {
        engine.press(note)?;
    }
    Ok(engine)
}

/// Vocode a modulator buffer with an external carrier buffer.
pub fn vocode_buffers(
    config: &EngineConfig,
    modulator: &[f32],
    carrier: &[f32],
) -> Result<Vec<f32>> {
    let mut engine = Engine::<Fixed>::new(config)?;
    let out = engine.vocode_carrier(&to_engine(modulator), &to_engine(carrier));
    Ok(from_engine(&out))
}

/// Hold `notes` and render `frames` samples of the bare synthesizer.
pub fn render_synth(config: &EngineConfig, notes: &[usize], frames: usize) -> Result<Vec<f32>> {
    let mut engine = engine_with_notes(config, notes)?;
    Ok(from_engine(&engine.render_synth(frames)))
}

/// Hold `notes` and vocode `modulator` with the synthesizer as carrier.
pub fn vocode_with_synth(
    config: &EngineConfig,
    notes: &[usize],
    modulator: &[f32],
) -> Result<Vec<f32>> {
    let mut engine = engine_with_notes(config, notes)?;
    Ok(from_engine(&engine.vocode(&to_engine(modulator))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::params::{ParamTarget, ParamTransform};
    use std::f64::consts::PI;
    use std::sync::Mutex;

    fn tone(freq: f64, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|n| (0.5 * (2.0 * PI * freq * n as f64).sin()) as f32)
            .collect()
    }

    struct Knob(u32);

    impl ControlSource for Knob {
        fn read(&mut self) -> u32 {
            self.0
        }

        fn select(&mut self, _address: usize) {}
    }

    /// Keeps the "active notes" records.
    struct NoteLog(Mutex<Vec<String>>);

    impl log::Log for NoteLog {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            let line = record.args().to_string();
            if line.starts_with("active notes") {
                self.0.lock().unwrap().push(line);
            }
        }

        fn flush(&self) {}
    }

    static NOTE_LOG: NoteLog = NoteLog(Mutex::new(Vec::new()));

    #[test]
    fn rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.vocoder.stages = 5;
        assert!(matches!(Engine::<Fixed>::new(&config), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn silent_without_notes() {
        let mut engine = Engine::<Fixed>::new(&EngineConfig::default()).unwrap();
        for m in tone(0.03, 2000) {
            assert_eq!(engine.process(Fixed::from_f64(m as f64)), Fixed::ZERO);
        }
    }

    #[test]
    fn output_gain_scales_output() {
        let config = EngineConfig::default();
        let mut full = Engine::<f32>::new(&config).unwrap();
        let mut half = Engine::<f32>::new(&config).unwrap();
        let mut params = *half.params();
        params.output_gain = 0.5;
        half.set_params(params).unwrap();
        full.press(12).unwrap();
        half.press(12).unwrap();

        let mut heard = false;
        for m in tone(0.03, 5000) {
            let a = full.process(m);
            let b = half.process(m);
            assert_eq!(b, a * 0.5);
            heard |= a != 0.0;
        }
        assert!(heard, "a held note with a live modulator should be audible");
    }

    #[test]
    fn controls_tick_on_schedule() {
        let mut config = EngineConfig::default();
        config.control_interval = 4;
        let mut engine = Engine::<Fixed>::new(&config).unwrap();
        let mut knob = Knob(32768);
        let before = *engine.params();

        for _ in 0..3 {
            engine.process_with_controls(Fixed::ZERO, &mut knob);
        }
        assert_eq!(*engine.params(), before);

        engine.process_with_controls(Fixed::ZERO, &mut knob);
        assert_eq!(config.multiplexer[0].target, ParamTarget::OutputGain);
        let gain = Fixed::from_f64(ParamTransform::Gain.apply(32768));
        assert_eq!(engine.params().output_gain, gain);
        assert_eq!(engine.params().attack, before.attack);

        for _ in 0..4 {
            engine.process_with_controls(Fixed::ZERO, &mut knob);
        }
        let attack = Fixed::from_f64(ParamTransform::ExponentialLerpFactor.apply(32768));
        assert_eq!(engine.params().attack, attack);
    }

    #[test]
    fn logs_held_notes_on_schedule() {
        let _ = log::set_logger(&NOTE_LOG);
        log::set_max_level(log::LevelFilter::Debug);

        let mut engine = Engine::<Fixed>::new(&EngineConfig::default()).unwrap();
        engine.press(12).unwrap();
        let mut knob = Knob(0);
        for _ in 0..2 * NOTE_LOG_INTERVAL {
            engine.process_with_controls(Fixed::ZERO, &mut knob);
        }
        let lines = NOTE_LOG.0.lock().unwrap();
        assert!(lines.iter().any(|l| l.contains("(12, ")), "held note not logged: {lines:?}");
    }

    #[test]
    fn set_params_rejects_invalid_snapshot() {
        let mut engine = Engine::<f32>::new(&EngineConfig::default()).unwrap();
        let before = *engine.params();
        let mut params = before;
        params.release = 0.0;
        assert!(matches!(engine.set_params(params), Err(EngineError::InvalidConfig(_))));
        assert_eq!(*engine.params(), before);
    }

    #[test]
    fn offline_synth_renders_chord() {
        let out = render_synth(&EngineConfig::default(), &DEMO_CHORD, 4410).unwrap();
        assert_eq!(out.len(), 4410);
        assert!(out.iter().any(|s| s.abs() > 0.05), "chord should be audible");
        assert!(out.iter().all(|s| s.abs() <= 1.05), "chord should stay near full scale");
    }

    #[test]
    fn offline_synth_rejects_bad_note() {
        let err = render_synth(&EngineConfig::default(), &[99], 10).unwrap_err();
        assert!(matches!(err, EngineError::NoteOutOfRange { note: 99, .. }), "got {err}");
    }

    #[test]
    fn vocode_buffers_pads_shorter_input() {
        let config = EngineConfig::default();
        let out = vocode_buffers(&config, &tone(0.03, 3000), &tone(0.03, 1000)).unwrap();
        assert_eq!(out.len(), 3000);
        assert!(out[..1000].iter().any(|&s| s != 0.0));

        let silent = vocode_buffers(&config, &tone(0.03, 500), &[]).unwrap();
        assert!(silent.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn vocode_with_synth_is_audible() {
        let modulator = tone(0.02, 10_000);
        let out = vocode_with_synth(&EngineConfig::default(), &DEMO_CHORD, &modulator).unwrap();
        assert_eq!(out.len(), 10_000);
        assert!(out.iter().any(|&s| s != 0.0));
        assert!(out.iter().all(|s| s.is_finite() && s.abs() < 4.0));
    }
}
