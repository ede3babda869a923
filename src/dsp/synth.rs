//! Synth — polyphonic voice pool with voice stealing.
//!
//! Pressing a note picks a voice in this order: the voice already holding the
//! note, the oldest silent voice, the oldest voice overall. The pool output is
//! the sum of every voice accumulated in wide precision and compacted once.

use log::{debug, trace};

use crate::config::SynthConfig;
use crate::error::{EngineError, Result};
use crate::params::AudioParams;

use super::envelope::EnvelopeState;
use super::num::{DspNum, Fixed};
use super::oscillator::SincQuadrature;
use super::voice::SynthVoice;

/// Ratio between neighbouring notes.
const SEMITONE: f64 = 1.059_463_094_359_295_3;

/// Precomputed per-note phase steps and the band-limiting quadrature.
///
/// Frequencies do not fit the fixed-point range, so notes are stored as the
/// fraction of a cycle they advance per sample.
#[derive(Debug, Clone)]
pub struct SynthTables<T: DspNum = Fixed> {
    phase_steps: Vec<T>,
    quadrature: SincQuadrature<T>,
}

impl<T: DspNum> SynthTables<T> {
    pub fn new(config: &SynthConfig, sample_rate: f64) -> Self {
        let mut freq = config.base_frequency;
        let phase_steps = (0..config.notes)
            .map(|_| {
                let step = T::from_f64(freq / sample_rate);
                freq *= SEMITONE;
                step
            })
            .collect();

        SynthTables {
            phase_steps,
            quadrature: SincQuadrature::default(),
        }
    }

    pub fn phase_step(&self, note: usize) -> Option<T> {
        self.phase_steps.get(note).copied()
    }

    pub fn note_count(&self) -> usize {
        self.phase_steps.len()
    }

    pub fn quadrature(&self) -> &SincQuadrature<T> {
        &self.quadrature
    }
}

/// The voice pool.
#[derive(Debug, Clone)]
pub struct Synth<T: DspNum = Fixed> {
    voices: Vec<SynthVoice<T>>,
    /// Stamp for the next pressed voice. Starts at 1 so untouched voices
    /// (age 0) are stolen first.
    next_age: u32,
    tables: SynthTables<T>,
}

impl<T: DspNum> Synth<T> {
    pub fn new(config: &SynthConfig, sample_rate: f64) -> Self {
        let epsilon = T::from_f64(config.envelope_epsilon);
        let voices = (0..config.voices)
            .map(|i| SynthVoice::new(i as i32, epsilon))
            .collect();

        debug!(
            "synth: {} voices, {} notes from {} Hz at {} Hz",
            config.voices, config.notes, config.base_frequency, sample_rate
        );

        Synth {
            voices,
            next_age: 1,
            tables: SynthTables::new(config, sample_rate),
        }
    }

    /// Start `note` and return the index of the voice that plays it.
    pub fn press(&mut self, note: usize) -> Result<usize> {
        let phase_step = self.tables.phase_step(note).ok_or(EngineError::NoteOutOfRange {
            note,
            notes: self.tables.note_count(),
        })?;
        let Some(idx) = self.pick_voice(note) else {
            return Err(EngineError::InvalidConfig("synth has no voices".into()));
        };

        let voice = &mut self.voices[idx];
        if voice.note().is_some_and(|held| held != note) && !voice.is_free() {
            trace!("note {note} steals voice {idx} from note {:?}", voice.note());
        } else {
            trace!("note {note} -> voice {idx}");
        }
        voice.note_on(note, phase_step, self.next_age);
        self.next_age = self.next_age.wrapping_add(1);
        Ok(idx)
    }

    /// Move every voice holding `note` into release.
    pub fn release(&mut self, note: usize) {
        for voice in self.voices.iter_mut().filter(|v| v.note() == Some(note)) {
            voice.note_off();
        }
    }

    fn pick_voice(&self, note: usize) -> Option<usize> {
        let oldest = |free_only: bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| !free_only || v.is_free())
                .min_by_key(|(_, v)| v.age())
                .map(|(i, _)| i)
        };

        self.voices
            .iter()
            .position(|v| v.note() == Some(note))
            .or_else(|| oldest(true))
            .or_else(|| oldest(false))
    }

    /// One sample of the whole pool.
    pub fn process(&mut self, params: &AudioParams<T>) -> T {
        let quadrature = &self.tables.quadrature;
        let mut acc = T::Wide::default();
        for voice in &mut self.voices {
            acc += voice.process(params, quadrature);
        }
        T::compact(acc)
    }

    pub fn voices(&self) -> &[SynthVoice<T>] {
        &self.voices
    }

    pub fn tables(&self) -> &SynthTables<T> {
        &self.tables
    }

    /// `(note, state)` for every voice that is still audible.
    pub fn active_notes(&self) -> Vec<(usize, EnvelopeState)> {
        self.voices
            .iter()
            .filter(|v| !v.is_free())
            .filter_map(|v| v.note().map(|n| (n, v.state())))
            .collect()
    }

    pub fn log_active_notes(&self) {
        debug!("active notes: {:?}", self.active_notes());
    }
}
