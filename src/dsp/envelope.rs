//! ADSR envelope with one-pole segments.

use serde::{Deserialize, Serialize};

use super::num::{DspNum, Fixed};

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeState {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Per-segment rates and the sustain level, borrowed from the current
/// parameter snapshot each tick.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeRates<T: DspNum = Fixed> {
    pub attack: T,
    pub decay: T,
    pub sustain: T,
    pub release: T,
}

/// ADSR envelope that moves one-pole toward each segment's target.
///
/// When the remaining distance to the target is within `epsilon`, the level
/// snaps to the target and the state advances (`Attack → Decay → Sustain`).
/// `Release` never advances on its own.
#[derive(Debug, Clone)]
pub struct Envelope<T: DspNum = Fixed> {
    state: EnvelopeState,
    level: T,
    epsilon: T,
}

impl<T: DspNum> Envelope<T> {
    /// A silent envelope in `Release`.
    pub fn new(epsilon: T) -> Self {
        Envelope {
            state: EnvelopeState::Release,
            level: T::ZERO,
            epsilon,
        }
    }

    /// Restart from silence in `Attack`.
    pub fn gate_on(&mut self) {
        self.level = T::ZERO;
        self.state = EnvelopeState::Attack;
    }

    pub fn gate_off(&mut self) {
        self.state = EnvelopeState::Release;
    }

    /// Advance one sample and return the new level.
    pub fn tick(&mut self, rates: &EnvelopeRates<T>) -> T {
        let (target, rate) = match self.state {
            EnvelopeState::Attack => (T::ONE, rates.attack),
            EnvelopeState::Decay => (rates.sustain, rates.decay),
            EnvelopeState::Sustain => return self.level,
            EnvelopeState::Release => (T::ZERO, rates.release),
        };

        let remaining = target - self.level;
        if remaining.abs() <= self.epsilon {
            self.level = target;
            self.state = match self.state {
                EnvelopeState::Attack => EnvelopeState::Decay,
                EnvelopeState::Decay => EnvelopeState::Sustain,
                other => other,
            };
        } else {
            self.level += remaining.mul(rate);
        }
        self.level
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn level(&self) -> T {
        self.level
    }

    /// Sustaining or releasing at exactly zero: available without stealing.
    pub fn is_free(&self) -> bool {
        matches!(self.state, EnvelopeState::Sustain | EnvelopeState::Release)
            && self.level == T::ZERO
    }
}
