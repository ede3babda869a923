//! Band-pass filter design.
//!
//! Builds an even-order Butterworth band-pass as a cascade of biquads:
//!
//! 1. analog low-pass prototype poles on the unit circle, zeros at infinity
//! 2. tangent pre-warping of the band edges
//! 3. a combined low-pass→band-pass + bilinear substitution that maps every
//!    analog root onto two digital roots
//! 4. expansion of each digital root pair into `a1`, `a2`
//! 5. a scale factor that gives unity gain at the band centre
//!
//! The numerators of the resulting stages are always `1 + 2z⁻¹ + z⁻²` (even
//! stages, zeros at `z = -1`) or `1 - 2z⁻¹ + z⁻²` (odd stages, zeros at
//! `z = +1`), so only the denominators and the scale are returned. Design runs
//! in `f64` and is not meant for the per-sample path.

use std::f64::consts::PI;

use log::debug;
use num_complex::Complex64;

use crate::error::DesignError;

/// Band edges closer than this to `0` or `π` are clamped before warping.
const WARP_CLAMP: f64 = 1e-8;

/// Denominator coefficients of one stage, normalised so that `a0 = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageCoefficients {
    pub a1: f64,
    pub a2: f64,
}

impl StageCoefficients {
    /// Numerator `b1` implied by the stage's position in the cascade.
    pub fn structural_b1(index: usize) -> f64 {
        if index % 2 == 0 { 2.0 } else { -2.0 }
    }
}

/// A designed band-pass cascade, still in floating point.
#[derive(Debug, Clone, PartialEq)]
pub struct BandpassDesign {
    /// Centre frequency in cycles per sample.
    pub center: f64,
    /// Bandwidth in cycles per sample.
    pub bandwidth: f64,
    pub stages: Vec<StageCoefficients>,
    /// Gain applied to the input taps of the first stage.
    pub scale: f64,
}

impl BandpassDesign {
    /// Magnitude response of the cascade, scale included, at `freq` cycles
    /// per sample.
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        let z_inv = Complex64::from_polar(1.0, -2.0 * PI * freq);
        let mut response = Complex64::new(self.scale, 0.0);
        for (i, stage) in self.stages.iter().enumerate() {
            let b1 = StageCoefficients::structural_b1(i);
            response *= eval_biquad(1.0, b1, 1.0, stage.a1, stage.a2, z_inv);
        }
        response.norm()
    }
}

/// A root of the analog prototype.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Root {
    Finite(Complex64),
    Infinity,
}

/// Two roots that make up one biquad's numerator or denominator.
#[derive(Debug, Clone, Copy)]
struct RootPair(Complex64, Complex64);

impl RootPair {
    /// Expand `(1 - r0 z⁻¹)(1 - r1 z⁻¹)` into `(c1, c2)`.
    fn expand(self, stage: usize) -> Result<(f64, f64), DesignError> {
        let RootPair(r0, r1) = self;
        if r0.im == 0.0 && r1.im == 0.0 {
            Ok((-(r0.re + r1.re), r0.re * r1.re))
        } else if r0 == r1.conj() {
            Ok((-2.0 * r0.re, r0.norm_sqr()))
        } else {
            Err(DesignError::UnpairedRoots { stage })
        }
    }
}

/// One stage before coefficient expansion.
#[derive(Debug, Clone, Copy)]
struct StageRoots {
    poles: RootPair,
    zeros: RootPair,
}

/// Design a band-pass filter of `stages` biquads.
///
/// `center` and `bandwidth` are in cycles per sample. `stages` must be even
/// and at least 2; the analog prototype has order `stages`.
pub fn design_bandpass(
    center: f64,
    bandwidth: f64,
    stages: usize,
) -> Result<BandpassDesign, DesignError> {
    if !center.is_finite() || center <= 0.0 || center >= 0.5 {
        return Err(DesignError::CenterOutOfRange { center });
    }
    if !bandwidth.is_finite() || bandwidth <= 0.0 {
        return Err(DesignError::InvalidBandwidth { bandwidth });
    }
    if stages < 2 || stages % 2 != 0 {
        return Err(DesignError::InvalidOrder { stages });
    }

    let low = warp(2.0 * PI * (center - bandwidth / 2.0));
    let high = warp(2.0 * PI * (center + bandwidth / 2.0));
    let warped_center = (low * high).sqrt();
    let warped_width = high - low;

    let mut roots = Vec::with_capacity(stages);
    for pole in prototype_poles(stages) {
        let (p0, p1) = lp_to_bp(Root::Finite(pole), warped_center, warped_width);
        let (z0, z1) = lp_to_bp(Root::Infinity, warped_center, warped_width);
        // The prototype's conjugate pole supplies the partner of each root.
        roots.push(StageRoots {
            poles: RootPair(p0, p0.conj()),
            zeros: RootPair(z0, z0.conj()),
        });
        roots.push(StageRoots {
            poles: RootPair(p1, p1.conj()),
            zeros: RootPair(z1, z1.conj()),
        });
    }

    let mut coefficients = Vec::with_capacity(stages);
    let mut numerators = Vec::with_capacity(stages);
    for (i, stage) in roots.iter().enumerate() {
        let (a1, a2) = stage.poles.expand(i)?;
        let (b1, b2) = stage.zeros.expand(i)?;
        coefficients.push(StageCoefficients { a1, a2 });
        numerators.push((b1, b2));
    }

    let center_omega = 2.0 * warped_center.atan();
    let z_inv = Complex64::from_polar(1.0, -center_omega);
    let mut response = Complex64::new(1.0, 0.0);
    for (stage, &(b1, b2)) in coefficients.iter().zip(&numerators) {
        response *= eval_biquad(1.0, b1, b2, stage.a1, stage.a2, z_inv);
    }
    let scale = 1.0 / response.norm();

    debug!(
        "designed band-pass: center={center:.5} width={bandwidth:.5} stages={stages} \
         scale={scale:.6e}"
    );

    Ok(BandpassDesign {
        center,
        bandwidth,
        stages: coefficients,
        scale,
    })
}

/// Upper-half-plane poles of an analog Butterworth low-pass of order `order`.
fn prototype_poles(order: usize) -> impl Iterator<Item = Complex64> {
    let step = PI / order as f64;
    (0..order / 2).map(move |k| Complex64::from_polar(1.0, PI / 2.0 + step * (k as f64 + 0.5)))
}

/// Bilinear pre-warp of a digital frequency in radians per sample.
fn warp(omega: f64) -> f64 {
    (omega.clamp(WARP_CLAMP, PI - WARP_CLAMP) / 2.0).tan()
}

/// Map one analog low-pass root onto its two digital band-pass roots.
///
/// Substituting `s = (z - 1)/(z + 1)` into `s² - p·B·s + W0² = 0` gives
/// `(1 - pB + W0²)z² + 2(W0² - 1)z + (1 + pB + W0²) = 0`. As `p → ∞` the
/// quadratic degenerates to `z² - 1 = 0`.
fn lp_to_bp(root: Root, center: f64, width: f64) -> (Complex64, Complex64) {
    match root {
        Root::Infinity => (Complex64::new(-1.0, 0.0), Complex64::new(1.0, 0.0)),
        Root::Finite(p) => {
            let w0_sq = center * center;
            let pb = p * width;
            let a = -pb + (1.0 + w0_sq);
            let b = Complex64::new(2.0 * (w0_sq - 1.0), 0.0);
            let c = pb + (1.0 + w0_sq);
            let disc = (b * b - a * c * 4.0).sqrt();
            ((-b + disc) / (a * 2.0), (-b - disc) / (a * 2.0))
        }
    }
}

fn eval_biquad(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64, z_inv: Complex64) -> Complex64 {
    let z_inv2 = z_inv * z_inv;
    let num = z_inv2 * b2 + z_inv * b1 + b0;
    let den = z_inv2 * a2 + z_inv * a1 + 1.0;
    num / den
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn rejects_center_outside_open_interval() {
        for &fc in &[0.0, -0.1, 0.5, 0.7, f64::NAN] {
            let err = design_bandpass(fc, 0.01, 4).unwrap_err();
            assert!(
                matches!(err, DesignError::CenterOutOfRange { .. }),
                "fc={fc} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_odd_or_tiny_order() {
        assert!(matches!(
            design_bandpass(0.1, 0.01, 3),
            Err(DesignError::InvalidOrder { stages: 3 })
        ));
        assert!(matches!(
            design_bandpass(0.1, 0.01, 0),
            Err(DesignError::InvalidOrder { stages: 0 })
        ));
    }

    #[test]
    fn rejects_non_positive_bandwidth() {
        assert!(matches!(
            design_bandpass(0.1, 0.0, 4),
            Err(DesignError::InvalidBandwidth { .. })
        ));
    }

    #[test]
    fn deterministic() {
        let a = design_bandpass(0.037, 0.011, 4).unwrap();
        let b = design_bandpass(0.037, 0.011, 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.scale.to_bits(), b.scale.to_bits());
    }

    #[test]
    fn stage_count_matches_order() {
        for stages in [2, 4, 6, 8] {
            let d = design_bandpass(0.1, 0.02, stages).unwrap();
            assert_eq!(d.stages.len(), stages);
        }
    }

    #[test]
    fn poles_inside_unit_circle() {
        let bands = [(0.002, 0.001), (0.01, 0.01), (0.1, 0.02), (0.45, 0.02), (0.498, 0.001)];
        for &(fc, fw) in &bands {
            let d = design_bandpass(fc, fw, 4).unwrap();
            for (i, s) in d.stages.iter().enumerate() {
                // For a conjugate pair a2 = |p|²; for a real pair |p0 p1| < 1
                // and |a1| < 1 + a2 is the stability triangle.
                assert!(s.a2 < 1.0, "stage {i} a2={} unstable for fc={fc}", s.a2);
                assert!(s.a1.abs() < 1.0 + s.a2, "stage {i} a1={} unstable for fc={fc}", s.a1);
            }
        }
    }

    #[test]
    fn unity_gain_at_center() {
        let d = design_bandpass(0.05, 0.01, 4).unwrap();
        let center_omega = 2.0 * (warp(2.0 * PI * 0.045) * warp(2.0 * PI * 0.055)).sqrt().atan();
        let gain = d.magnitude_at(center_omega / (2.0 * PI));
        assert!(approx_eq!(f64, gain, 1.0, epsilon = 1e-9), "center gain {gain}");
    }

    #[test]
    fn attenuates_outside_band() {
        let d = design_bandpass(0.05, 0.01, 4).unwrap();
        assert!(d.magnitude_at(0.01) < 0.01, "low stop-band {}", d.magnitude_at(0.01));
        assert!(d.magnitude_at(0.2) < 0.01, "high stop-band {}", d.magnitude_at(0.2));
        assert!(d.magnitude_at(0.0) < 1e-9, "DC should be blocked");
    }

    #[test]
    fn butterworth_edges_near_half_power() {
        let d = design_bandpass(0.1, 0.02, 4).unwrap();
        let lo = d.magnitude_at(0.09);
        let hi = d.magnitude_at(0.11);
        let half_power = 1.0 / 2f64.sqrt();
        assert!((lo - half_power).abs() < 0.01, "lower edge {lo}");
        assert!((hi - half_power).abs() < 0.01, "upper edge {hi}");
    }

    #[test]
    fn infinity_maps_to_plus_minus_one() {
        let (z0, z1) = lp_to_bp(Root::Infinity, 0.3, 0.1);
        assert_eq!(z0, Complex64::new(-1.0, 0.0));
        assert_eq!(z1, Complex64::new(1.0, 0.0));
    }

    #[test]
    fn unpaired_roots_rejected() {
        let pair = RootPair(Complex64::new(0.5, 0.1), Complex64::new(0.5, 0.2));
        assert!(matches!(pair.expand(3), Err(DesignError::UnpairedRoots { stage: 3 })));
        let real = RootPair(Complex64::new(0.5, 0.0), Complex64::new(-0.25, 0.0));
        assert_eq!(real.expand(0).unwrap(), (-0.25, -0.125));
    }

    #[test]
    fn warp_clamps_singular_edges() {
        assert!(warp(0.0) > 0.0);
        assert!(warp(PI).is_finite());
        assert!(warp(-1.0) > 0.0);
    }
}
