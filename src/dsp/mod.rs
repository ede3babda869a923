//! DSP core — fixed-point arithmetic, band-pass design, vocoder and synth.
//!
//! Every per-sample component is generic over [`num::DspNum`], so the same
//! code runs in Q4.28 fixed point on the embedded target and in `f32` for
//! comparison and offline work.

pub mod design;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod num;
pub mod oscillator;
pub mod synth;
pub mod vocoder;
pub mod voice;
