//! Cascaded band-pass biquads — the runtime half of [`super::design`].

use crate::error::DesignError;

use super::design::BandpassDesign;
use super::num::{DspNum, Fixed};

/// Largest relative error allowed when the scale is rounded to `T`.
pub const MAX_SCALE_ERROR: f64 = 0.01;

/// The last three input samples, newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleWindow<T: DspNum = Fixed>([T; 3]);

impl<T: DspNum> SampleWindow<T> {
    pub fn new() -> Self {
        SampleWindow([T::ZERO; 3])
    }

    /// Shift the history and store `sample` as the newest tap.
    pub fn push(&mut self, sample: T) {
        self.0[2] = self.0[1];
        self.0[1] = self.0[0];
        self.0[0] = sample;
    }

    pub fn taps(&self) -> &[T; 3] {
        &self.0
    }
}

/// One biquad of a band-pass cascade.
///
/// Only `a1` and `a2` are stored. The numerator is fixed by position:
/// `1 + 2z⁻¹ + z⁻²` on even stages and `1 - 2z⁻¹ + z⁻²` on odd stages.
#[derive(Debug, Clone)]
pub struct BandpassStage<T: DspNum = Fixed> {
    a1: T,
    a2: T,
    /// Output history, newest first.
    y: [T; 3],
}

impl<T: DspNum> BandpassStage<T> {
    pub fn new(a1: T, a2: T) -> Self {
        BandpassStage {
            a1,
            a2,
            y: [T::ZERO; 3],
        }
    }

    /// Direct Form I update. `feedforward` is the already-combined input
    /// taps in accumulator width; the feedback terms join it there so the
    /// stage rounds exactly once.
    #[inline]
    fn update(&mut self, feedforward: T::Wide) -> T {
        self.y[2] = self.y[1];
        self.y[1] = self.y[0];

        let acc = feedforward - self.a1.mul_wide(self.y[1]) - self.a2.mul_wide(self.y[2]);

        self.y[0] = T::compact(acc).flush_denormal();
        self.y[0]
    }

    pub fn output(&self) -> T {
        self.y[0]
    }

    pub fn history(&self) -> &[T; 3] {
        &self.y
    }
}

/// An even-length chain of [`BandpassStage`]s with the scale applied at the
/// first stage.
#[derive(Debug, Clone)]
pub struct CascadedBiquad<T: DspNum = Fixed> {
    stages: Vec<BandpassStage<T>>,
    scale: T,
}

impl<T: DspNum> CascadedBiquad<T> {
    /// Convert a floating-point design into runtime coefficients.
    ///
    /// Narrow low bands have tiny scales. Fails when the scale rounds to
    /// zero in `T` or loses more than [`MAX_SCALE_ERROR`] of its value.
    pub fn from_design(design: &BandpassDesign) -> Result<Self, DesignError> {
        let scale = T::from_f64(design.scale);
        let error = (scale.to_f64() - design.scale).abs() / design.scale;
        if scale == T::ZERO || !(error <= MAX_SCALE_ERROR) {
            return Err(DesignError::ScaleUnderflow {
                scale: design.scale,
                center: design.center,
            });
        }

        Ok(CascadedBiquad {
            stages: design
                .stages
                .iter()
                .map(|s| BandpassStage::new(T::from_f64(s.a1), T::from_f64(s.a2)))
                .collect(),
            scale,
        })
    }

    /// Process one sample. `window` holds the cascade input, newest first,
    /// and must already contain the current sample.
    pub fn process(&mut self, window: &SampleWindow<T>) -> T {
        let [x0, x1, x2] = *window.taps();
        let scale = self.scale;

        let Some((first, rest)) = self.stages.split_first_mut() else {
            return T::ZERO;
        };
        first.update(x0.mul_wide(scale) + x1.shl(1).mul_wide(scale) + x2.mul_wide(scale));

        let mut input = *first.history();
        for (i, stage) in rest.iter_mut().enumerate() {
            let [x0, x1, x2] = input;
            // `rest` starts at stage 1, so even `i` is an odd stage.
            let feedforward = if i % 2 == 0 {
                x0.widen() - x1.shl(1).widen() + x2.widen()
            } else {
                x0.widen() + x1.shl(1).widen() + x2.widen()
            };
            stage.update(feedforward);
            input = *stage.history();
        }

        input[0]
    }

    /// Clear all output histories.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.y = [T::ZERO; 3];
        }
    }

    pub fn scale(&self) -> T {
        self.scale
    }

    pub fn stages(&self) -> &[BandpassStage<T>] {
        &self.stages
    }

    pub fn output(&self) -> T {
        self.stages.last().map_or(T::ZERO, BandpassStage::output)
    }
}
